//! Collection through Telegraf's vSphere input, run as a one-shot subprocess
use std::io::Write as _;
use std::path::Path;
use std::time::Duration;

use log::{debug, error, info};
use tempfile::NamedTempFile;

use super::config::{CollectionConfig, EntityKind};
use super::record::{MetricRecord, MetricsCollector};
use crate::error::{ProbeError, Result};
use crate::process::{Command, ProcessError};

/// Child environment variable carrying the login identity
pub const USERNAME_ENV: &str = "VCPROBE_VSPHERE_USERNAME";
/// Child environment variable carrying the login credential
pub const PASSWORD_ENV: &str = "VCPROBE_VSPHERE_PASSWORD";

/// Extra time the whole run may take beyond the per-request timeout
const DEADLINE_GRACE: Duration = Duration::from_secs(30);

/// Runs `telegraf --once` against a rendered config and parses its JSON output
#[derive(Debug, Clone)]
pub struct TelegrafCollector {
    binary: String,
    name: String,
}

impl TelegrafCollector {
    /// Create a collector that runs the given telegraf binary
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            name: "telegraf_vsphere".to_string(),
        }
    }

    /// Render the telegraf configuration for one collection pass
    ///
    /// Credentials are referenced through environment placeholders and never
    /// written to the file.
    pub fn render_config(config: &CollectionConfig) -> String {
        let mut out = String::new();

        out.push_str("[agent]\n");
        out.push_str("  omit_hostname = true\n\n");

        out.push_str("[[outputs.file]]\n");
        out.push_str("  files = [\"stdout\"]\n");
        out.push_str("  data_format = \"json\"\n\n");

        out.push_str("[[inputs.vsphere]]\n");
        push_setting(&mut out, "vcenters", &toml_array(&config.vcenters));
        push_setting(&mut out, "username", &toml_string(&format!("${{{}}}", USERNAME_ENV)));
        push_setting(&mut out, "password", &toml_string(&format!("${{{}}}", PASSWORD_ENV)));

        for kind in EntityKind::ALL {
            let filter = config.filter(kind);
            if !filter.include.is_empty() {
                push_setting(&mut out, &format!("{}_metric_include", kind), &toml_array(&filter.include));
            }
            if !filter.exclude.is_empty() {
                push_setting(&mut out, &format!("{}_metric_exclude", kind), &toml_array(&filter.exclude));
            }
        }

        push_setting(&mut out, "vm_instances", &config.vm_instances.to_string());
        push_setting(&mut out, "collect_concurrency", &config.collect_concurrency.to_string());
        push_setting(&mut out, "discover_concurrency", &config.discover_concurrency.to_string());
        push_setting(&mut out, "max_query_metrics", &config.max_query_metrics.to_string());
        push_setting(&mut out, "force_discover_on_init", &config.force_discover_on_init.to_string());
        push_setting(&mut out, "timeout", &toml_string(&toml_duration(config.timeout)));

        out
    }

    /// Command that runs one pass against the config file at `config_path`
    pub fn command(&self, config_path: &Path, config: &CollectionConfig) -> Command {
        Command::new(&self.binary)
            .args(["--once", "--config"])
            .arg(config_path.to_string_lossy())
            .env(USERNAME_ENV, config.username.as_str())
            .env(PASSWORD_ENV, config.password.expose())
            .capture_stdout(true)
            .capture_stderr(true)
    }
}

#[async_trait::async_trait]
impl MetricsCollector for TelegrafCollector {
    async fn gather(&self, config: &CollectionConfig) -> Result<Vec<MetricRecord>> {
        let mut file = NamedTempFile::new()?;
        file.write_all(Self::render_config(config).as_bytes())?;
        file.flush()?;
        debug!("Rendered collector config to {}", file.path().display());

        let deadline = config.timeout + DEADLINE_GRACE;
        info!(
            "Gathering metrics from {} via {} (deadline {:?})",
            config.vcenters.join(", "),
            self.binary,
            deadline
        );

        let handle = self.command(file.path(), config).spawn()?;
        let output = handle.wait_with_output(deadline).await?;

        if !output.status.success() {
            for line in &output.stderr_tail {
                error!("[{}] {}", self.binary, line);
            }
            return Err(ProcessError::NonZeroExit(output.status).into());
        }

        let records = parse_records(&output.stdout.join("\n"))?;
        debug!("Collector returned {} records", records.len());
        Ok(records)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Parse newline-delimited JSON metric records
pub fn parse_records(output: &str) -> Result<Vec<MetricRecord>> {
    output
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| {
                ProbeError::from(ProcessError::ParseError(format!("line {}: {}", i + 1, e)))
            })
        })
        .collect()
}

/// Append an indented `key = value` line to a plugin table
fn push_setting(out: &mut String, key: &str, value: &str) {
    out.push_str(&format!("  {} = {}\n", key, value));
}

/// Quote a string as a TOML basic string
fn toml_string(value: &str) -> String {
    // JSON string escapes are a subset of TOML basic string escapes.
    serde_json::Value::String(value.to_string()).to_string()
}

fn toml_array(values: &[String]) -> String {
    let quoted: Vec<String> = values.iter().map(|v| toml_string(v)).collect();
    format!("[{}]", quoted.join(", "))
}

fn toml_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::config::{CollectionConfigBuilder, MetricFilter, Secret};
    use crate::collector::record::FieldValue;

    fn sample_config() -> CollectionConfig {
        CollectionConfigBuilder::new("vcsa.lab.local")
            .credentials("admin@vsphere.local", Secret::new("s3cr\"et"))
            .filter(EntityKind::Vm, MetricFilter::only(["cpu.usagemhz.average"]))
            .filter(EntityKind::Host, MetricFilter::exclude_all())
            .filter(EntityKind::Cluster, MetricFilter::exclude_all())
            .filter(EntityKind::Datacenter, MetricFilter::exclude_all())
            .filter(EntityKind::Datastore, MetricFilter::exclude_all())
            .build()
    }

    #[test]
    fn test_render_config() {
        let rendered = TelegrafCollector::render_config(&sample_config());

        assert!(rendered.contains("vcenters = [\"https://vcsa.lab.local/sdk\"]"));
        assert!(rendered.contains("username = \"${VCPROBE_VSPHERE_USERNAME}\""));
        assert!(rendered.contains("password = \"${VCPROBE_VSPHERE_PASSWORD}\""));
        assert!(rendered.contains("vm_metric_include = [\"cpu.usagemhz.average\"]"));
        assert!(rendered.contains("host_metric_exclude = [\"*\"]"));
        assert!(rendered.contains("cluster_metric_exclude = [\"*\"]"));
        assert!(rendered.contains("datacenter_metric_exclude = [\"*\"]"));
        assert!(rendered.contains("datastore_metric_exclude = [\"*\"]"));
        assert!(!rendered.contains("vm_metric_exclude"));
        assert!(rendered.contains("collect_concurrency = 8"));
        assert!(rendered.contains("discover_concurrency = 4"));
        assert!(rendered.contains("max_query_metrics = -1"));
        assert!(rendered.contains("force_discover_on_init = true"));
        assert!(rendered.contains("vm_instances = false"));
        assert!(rendered.contains("timeout = \"60s\""));
        assert!(rendered.contains("data_format = \"json\""));
    }

    #[test]
    fn test_render_config_keeps_credentials_out() {
        let rendered = TelegrafCollector::render_config(&sample_config());

        assert!(!rendered.contains("admin@vsphere.local"));
        assert!(!rendered.contains("s3cr"));
    }

    #[test]
    fn test_command_passes_credentials_through_env() {
        let collector = TelegrafCollector::new("/usr/bin/telegraf");
        let command = collector.command(Path::new("/tmp/probe.conf"), &sample_config());

        assert_eq!(command.program(), "/usr/bin/telegraf");
        assert_eq!(command.get_args(), ["--once", "--config", "/tmp/probe.conf"]);
        assert_eq!(command.get_env(USERNAME_ENV), Some("admin@vsphere.local"));
        assert_eq!(command.get_env(PASSWORD_ENV), Some("s3cr\"et"));
    }

    #[test]
    fn test_parse_records() {
        let output = concat!(
            r#"{"fields":{"value":1234.5},"name":"cpu.usagemhz.average","tags":{"vmname":"web01"},"timestamp":1718000000}"#,
            "\n\n",
            r#"{"fields":{"value":7},"name":"cpu.usage.average","tags":{}}"#,
            "\n"
        );

        let records = parse_records(output).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "cpu.usagemhz.average");
        assert_eq!(records[0].field("value"), Some(&FieldValue::Float(1234.5)));
        assert_eq!(records[0].timestamp, Some(1718000000));
        assert_eq!(records[1].field("value"), Some(&FieldValue::Integer(7)));
    }

    #[test]
    fn test_parse_records_rejects_garbage() {
        let err = parse_records("{\"name\":\"ok\"}\nnot json\n").unwrap_err();
        assert!(matches!(err, ProbeError::Collection(ref msg) if msg.contains("line 2")));
    }

    #[test]
    fn test_duration_rendering() {
        assert_eq!(toml_duration(Duration::from_secs(60)), "60s");
        assert_eq!(toml_duration(Duration::from_millis(1500)), "1500ms");
    }

    #[tokio::test]
    async fn test_gather_fails_when_binary_missing() {
        let collector = TelegrafCollector::new("/nonexistent/telegraf");
        let err = collector.gather(&sample_config()).await.unwrap_err();

        assert!(matches!(err, ProbeError::Collection(_)));
    }

    #[cfg(unix)]
    fn fake_telegraf(dir: &Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("telegraf");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_gather_runs_binary_and_parses_output() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_telegraf(
            dir.path(),
            r#"[ "$1" = "--once" ] && [ "$2" = "--config" ] || exit 9
grep -q 'vm_metric_include = \["cpu.usagemhz.average"\]' "$3" || exit 8
echo "{\"name\":\"cpu.usagemhz.average\",\"fields\":{\"value\":42.5},\"tags\":{\"user\":\"$VCPROBE_VSPHERE_USERNAME\"}}"
echo "{\"name\":\"cpu.usage.average\",\"fields\":{\"value\":3}}""#,
        );

        let records = TelegrafCollector::new(binary)
            .gather(&sample_config())
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "cpu.usagemhz.average");
        assert_eq!(records[0].field("value"), Some(&FieldValue::Float(42.5)));
        assert_eq!(
            records[0].tags.get("user").map(String::as_str),
            Some("admin@vsphere.local")
        );
        assert_eq!(records[1].field("value"), Some(&FieldValue::Integer(3)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_gather_fails_on_non_zero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_telegraf(dir.path(), "echo 'E! cannot login' >&2\nexit 2");

        let err = TelegrafCollector::new(binary)
            .gather(&sample_config())
            .await
            .unwrap_err();

        assert!(matches!(err, ProbeError::Collection(ref msg) if msg.contains("non-zero")));
    }
}
