#[cfg(test)]
mod tests {
    use crate::commands::{BuildArgs, CacheArgs, VersionArgs};
    use crate::config::CliConfig;
    use anvil_core::{Error, JarNaming};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    const YAML: &str = r#"
versions: "1.20.1, latest"
threads: 2
remapped: true
maven_repository: /srv/m2
cache:
  host: cache.example.com
  port: 2222
  username: ci
  expected_host_key: "ssh-ed25519 AAAAC3Nza"
  transfer_binary: null
"#;

    #[test]
    fn test_defaults() {
        let config = CliConfig::default();
        assert_eq!(config.provider, "spigotmc");
        assert_eq!(config.version_tokens().unwrap(), vec!["latest"]);
        assert!(config.thread_count() >= 1);
        assert!(!config.cache.endpoint.is_configured());
        assert_eq!(config.jar_naming(), JarNaming::Standard);
    }

    #[test]
    fn test_yaml_file() {
        let config = CliConfig::from_yaml(YAML).unwrap();
        assert_eq!(config.version_tokens().unwrap(), vec!["1.20.1", "latest"]);
        assert_eq!(config.thread_count(), 2);
        assert_eq!(config.jar_naming(), JarNaming::Remapped);
        assert_eq!(config.repository().unwrap().root(), PathBuf::from("/srv/m2"));
        assert_eq!(config.cache.endpoint.port, 2222);
        assert_eq!(config.cache.endpoint.expected_host_key(), Some("ssh-ed25519 AAAAC3Nza"));
        assert!(config.cache.channel_options().transfer_binary.is_none());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = CliConfig::from_yaml("{}").unwrap();
        assert_eq!(config.versions, "latest");
        assert_eq!(config.cache.channel_options().transfer_binary.as_deref(), Some("scp"));
    }

    #[test]
    fn test_malformed_yaml() {
        assert!(matches!(CliConfig::from_yaml("threads: [1"), Err(Error::Config(_))));
    }

    #[test]
    fn test_flags_override_file() {
        let mut config = CliConfig::from_yaml(YAML).unwrap();
        config.apply_build_args(&BuildArgs {
            versions: VersionArgs {
                versions: Some("1.19.4".into()),
                ..Default::default()
            },
            threads: Some(8),
            generate_docs: true,
            cache: CacheArgs {
                cache_host: Some(String::new()),
                cache_port: Some(22),
                ..Default::default()
            },
            ..Default::default()
        });

        assert_eq!(config.version_tokens().unwrap(), vec!["1.19.4"]);
        assert_eq!(config.thread_count(), 8);
        assert!(config.generate_docs);
        assert!(config.remapped);
        assert!(!config.cache.endpoint.is_configured());
        assert_eq!(config.cache.endpoint.port, 22);
    }

    #[test]
    fn test_invalid_version_token() {
        let config = CliConfig {
            versions: "1.20.1,../../etc".into(),
            ..Default::default()
        };
        assert!(matches!(config.version_tokens(), Err(Error::InvalidVersion(_))));
    }

    #[test]
    fn test_zero_threads_falls_back_to_cpus() {
        let config = CliConfig {
            threads: Some(0),
            ..Default::default()
        };
        assert!(config.thread_count() >= 1);
    }

    #[test]
    fn test_cache_endpoint_reads_env_key_only_when_configured() {
        let disabled = CliConfig::default();
        assert_eq!(disabled.cache_endpoint(Some("KEY".into())).unwrap().private_key, "");

        let config = CliConfig::from_yaml(YAML).unwrap();
        assert_eq!(config.cache_endpoint(Some("KEY".into())).unwrap().private_key, "KEY");
    }

    #[test]
    fn test_relative_output_dir_is_made_absolute() {
        let config = CliConfig {
            output_dir: Some(PathBuf::from("jars")),
            ..Default::default()
        };
        let options = config.build_tools_options().unwrap();
        let dir = options.output_dir.unwrap();
        assert!(dir.is_absolute());
        assert!(dir.ends_with("jars"));
    }
}
