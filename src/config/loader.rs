use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::AppConfig;

/// Load configuration from a file using the config crate
/// Supports multiple formats: YAML, JSON, TOML, etc.
pub async fn load_config(config_path: &str) -> Result<AppConfig> {
    load_config_sync(config_path)
}

/// Load configuration synchronously
///
/// Scalar settings may be overridden with `ARBOR_` prefixed environment variables, e.g.
/// `ARBOR_COMPRESSION=true` or `ARBOR_LOG__LEVEL=debug`.
pub fn load_config_sync(config_path: &str) -> Result<AppConfig> {
    let config_path = Path::new(config_path);

    // Determine file format based on extension
    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        _ => FileFormat::Yaml, // Default to YAML
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .add_source(Environment::with_prefix("ARBOR").separator("__"))
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let app_config: AppConfig = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[tokio::test]
    async fn test_load_yaml_config() {
        let yaml_content = r#"
listen:
  - address: "127.0.0.1:3000"
sites:
  - name: "docs"
    root_dir: "/srv/docs"
    hosts: ["docs.example.com"]
    nodes:
      - names: [["api", "v2"]]
        relative_dir: "api"
"#;

        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.listen[0].address, "127.0.0.1:3000");
        assert_eq!(config.sites.len(), 1);
        assert!(config.sites[0].nodes[0].names.is_match("api.v2"));
        assert!(!config.compression);
    }

    #[tokio::test]
    async fn test_load_toml_config() {
        let toml_content = r#"
compression = true

[[listen]]
address = "0.0.0.0:8080"

[log]
level = "debug"
json = true

[[sites]]
name = "main"
host_ports = [8080]
static_fallback = false

[sites.cdn]
host = "cdn.example.com"
origin_host = "example.com"
"#;

        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert!(config.compression);
        assert!(config.log.json);
        assert_eq!(config.sites[0].host_ports, Some(vec![8080]));
        assert!(!config.sites[0].static_fallback);
        assert_eq!(config.sites[0].cdn.as_ref().unwrap().origin_host, "example.com");
    }

    #[tokio::test]
    async fn test_load_json_config() {
        let json_content = r#"
{
  "listen": [{"address": "127.0.0.1:3000"}],
  "sites": [{"name": "a"}, {"name": "b", "ips": ["10.0.0.1"]}]
}
"#;

        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, "{}", json_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.sites.len(), 2);
        assert_eq!(config.sites[1].ips, Some(vec!["10.0.0.1".to_string()]));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(load_config_sync("/definitely/not/here.toml").is_err());
    }
}
