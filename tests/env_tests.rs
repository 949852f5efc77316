//! # Environment layer tests
//!
//! `PREVIEWCAST_*` variables merged between the config file and the CLI.
//! Each test runs inside a figment `Jail`, which serializes environment
//! access and runs in a fresh working directory.

use clap::Parser;
use figment::Jail;
use previewcast::config::{CliArgs, ProviderOptions};
use previewcast::error::ValidationError;
use std::path::Path;

fn cli(args: &[&str]) -> CliArgs {
    CliArgs::parse_from(std::iter::once("previewcast").chain(args.iter().copied()))
}

#[test]
fn test_env_project_root_keys_map_to_project_root() {
    Jail::expect_with(|jail| {
        jail.set_env("PREVIEWCAST_PROJECT_ROOT", "/srv/api-project");
        let options = ProviderOptions::load(&cli(&[])).map_err(|e| e.to_string())?;
        assert_eq!(options.project_root, Path::new("/srv/api-project"));
        Ok(())
    });

    Jail::expect_with(|jail| {
        jail.set_env("PREVIEWCAST_PROJECTROOT", "/srv/other-project");
        let options = ProviderOptions::load(&cli(&[])).map_err(|e| e.to_string())?;
        assert_eq!(options.project_root, Path::new("/srv/other-project"));
        Ok(())
    });
}

#[test]
fn test_env_values_are_typed() {
    Jail::expect_with(|jail| {
        jail.set_env("PREVIEWCAST_API", "main.raml");
        jail.set_env("PREVIEWCAST_PORT", 50123);
        jail.set_env("PREVIEWCAST_VERBOSE", true);
        let options = ProviderOptions::load(&cli(&[])).map_err(|e| e.to_string())?;
        assert_eq!(options.api, "main.raml");
        assert_eq!(options.port, Some(50123));
        assert!(options.verbose);
        Ok(())
    });
}

#[test]
fn test_env_overrides_config_file_and_cli_overrides_env() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "previewcast.toml",
            r#"
                api = "file.raml"
                port = 50001
                host = "file-host"
            "#,
        )?;
        jail.set_env("PREVIEWCAST_PORT", 50002);
        jail.set_env("PREVIEWCAST_HOST", "env-host");

        let options = ProviderOptions::load(&cli(&[])).map_err(|e| e.to_string())?;
        assert_eq!(options.api, "file.raml");
        assert_eq!(options.port, Some(50002));
        assert_eq!(options.host.as_deref(), Some("env-host"));

        let options =
            ProviderOptions::load(&cli(&["--port", "50003"])).map_err(|e| e.to_string())?;
        assert_eq!(options.api, "file.raml");
        assert_eq!(options.port, Some(50003));
        assert_eq!(options.host.as_deref(), Some("env-host"));
        Ok(())
    });
}

#[test]
fn test_unknown_env_key_rejects_configuration() {
    Jail::expect_with(|jail| {
        jail.set_env("PREVIEWCAST_FOO", "bar");
        jail.set_env("PREVIEWCAST_API", "api.raml");

        let error = ProviderOptions::load(&cli(&[]))
            .expect_err("unknown environment key should reject the configuration");
        assert_eq!(
            error.validation_errors(),
            [ValidationError::UnknownOptions(vec!["foo".to_string()])]
        );
        Ok(())
    });
}
