// ABOUTME: Integration tests for fleet configuration parsing and validation.
// ABOUTME: Tests YAML parsing, host forms, env interpolation, and cross-reference checks.

use drover::config::*;
use drover::error::Error;
use std::collections::BTreeMap;
use std::time::Duration;

mod parsing {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let yaml = r#"
hosts:
  - web1.example.com
"#;
        let config = FleetConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.hosts.len(), 1);
        assert!(config.swarms.is_empty());
        assert_eq!(config.max_parallel_tasks, 16);
        assert_eq!(config.timeouts.deploy, Duration::from_secs(600));
    }

    #[test]
    fn parse_full_config() {
        let yaml = r#"
hosts:
  - deploy@web1.example.com:2222
  - name: web2
    ssh_host: 10.0.0.2
    ports: "6000-6010"
    active: false

apps:
  billing:
    repo_url: https://git.example.com/billing.git
    repo_type: hg

balancers:
  lb: http://lb.example.com:8080

timeouts:
  deploy: 5m
  uptest: 30s

port_lock_max_age: 10m
build_wait_age: 2h
max_parallel_tasks: 4

swarms:
  - id: billing-web
    app: billing
    version: v7
    proc: web
    config_name: prod
    size: 4
    pool:
      balancer: lb
      name: billing-prod
    run_as: billing:web
    env:
      MODE: live
"#;
        let config = FleetConfig::from_yaml(yaml).unwrap();

        let web1 = config.hosts.first();
        assert_eq!(web1.name, "web1.example.com");
        assert_eq!(web1.user.as_deref(), Some("deploy"));
        assert_eq!(web1.ssh_port, 2222);

        let web2 = config.hosts.get(1).unwrap();
        assert_eq!(web2.ssh_address(), "10.0.0.2");
        assert_eq!(web2.ports, PortRange::new(6000, 6010).unwrap());
        assert!(!web2.active);

        assert_eq!(config.timeouts.deploy, Duration::from_secs(300));
        assert_eq!(config.timeouts.uptest, Duration::from_secs(30));
        assert_eq!(config.port_lock_max_age, Duration::from_secs(600));
        assert_eq!(config.build_wait_age, Duration::from_secs(7200));
        assert_eq!(config.max_parallel_tasks, 4);

        let swarm = config.swarm("billing-web").unwrap();
        assert_eq!(swarm.size, 4);
        assert_eq!(swarm.config_name, "prod");
        assert_eq!(swarm.pool.as_ref().map(|p| p.name.as_str()), Some("billing-prod"));
    }

    #[test]
    fn unknown_swarm_is_an_error() {
        let config = FleetConfig::from_yaml("hosts: [web1]").unwrap();
        assert!(matches!(config.swarm("nope"), Err(Error::UnknownSwarm(_))));
    }
}

mod validation {
    use super::*;

    #[test]
    fn rejects_empty_host_list() {
        assert!(FleetConfig::from_yaml("hosts: []").is_err());
    }

    #[test]
    fn rejects_duplicate_hosts() {
        let err = FleetConfig::from_yaml("hosts: [web1, web1]").unwrap_err();
        assert!(err.to_string().contains("duplicate host"));
    }

    #[test]
    fn rejects_swarm_with_unknown_app() {
        let yaml = r#"
hosts: [web1]
swarms:
  - id: s
    app: ghost
    version: v1
    proc: web
    size: 1
"#;
        let err = FleetConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("unknown app ghost"));
    }

    #[test]
    fn rejects_pool_on_unknown_balancer() {
        let yaml = r#"
hosts: [web1]
apps:
  billing:
    repo_url: https://git.example.com/billing.git
swarms:
  - id: s
    app: billing
    version: v1
    proc: web
    size: 1
    pool:
      balancer: nowhere
      name: p
"#;
        let err = FleetConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("unknown balancer nowhere"));
    }

    #[test]
    fn rejects_zero_parallelism() {
        let err = FleetConfig::from_yaml("hosts: [web1]\nmax_parallel_tasks: 0").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn rejects_inverted_port_range() {
        let yaml = r#"
hosts:
  - name: web1
    ports: "6000-5000"
"#;
        assert!(FleetConfig::from_yaml(yaml).is_err());
    }
}

mod discovery {
    use super::*;

    #[test]
    fn finds_config_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILENAME), "hosts: [web1]").unwrap();

        let config = FleetConfig::discover(dir.path()).unwrap();
        assert_eq!(config.hosts.first().name, "web1");
    }

    #[test]
    fn missing_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = FleetConfig::discover(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound(_)));
    }

    #[test]
    fn init_writes_a_loadable_template() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), false).unwrap();

        let config = FleetConfig::discover(dir.path()).unwrap();
        assert_eq!(config.swarms.len(), 1);

        let err = init_config(dir.path(), false).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
        init_config(dir.path(), true).unwrap();
    }
}

mod env_values {
    use super::*;

    #[test]
    fn resolves_literals_env_and_defaults() {
        let mut env_map = BTreeMap::new();
        env_map.insert("KEY".to_string(), EnvValue::Literal("literal".to_string()));
        env_map.insert(
            "FROM_ENV".to_string(),
            EnvValue::FromEnv {
                var: "DROVER_TEST_VAR".to_string(),
                default: None,
            },
        );
        env_map.insert(
            "WITH_DEFAULT".to_string(),
            EnvValue::FromEnv {
                var: "DROVER_TEST_UNSET".to_string(),
                default: Some("default_value".to_string()),
            },
        );

        temp_env::with_vars(
            [
                ("DROVER_TEST_VAR", Some("from_environment")),
                ("DROVER_TEST_UNSET", None),
            ],
            || {
                let resolved = resolve_env_map(&env_map).unwrap();
                assert_eq!(resolved["KEY"], "literal");
                assert_eq!(resolved["FROM_ENV"], "from_environment");
                assert_eq!(resolved["WITH_DEFAULT"], "default_value");
            },
        );
    }

    #[test]
    fn missing_variable_without_default_fails() {
        let value = EnvValue::FromEnv {
            var: "DROVER_TEST_MISSING".to_string(),
            default: None,
        };
        temp_env::with_var_unset("DROVER_TEST_MISSING", || {
            assert!(matches!(value.resolve(), Err(Error::MissingEnvVar(_))));
        });
    }

    #[test]
    fn swarm_env_parses_both_forms() {
        let yaml = r#"
hosts: [web1]
apps:
  billing:
    repo_url: https://git.example.com/billing.git
swarms:
  - id: s
    app: billing
    version: v1
    proc: web
    size: 1
    env:
      MODE: live
      TOKEN:
        env: DROVER_TEST_TOKEN
        default: none
"#;
        let config = FleetConfig::from_yaml(yaml).unwrap();
        let swarm = config.swarm("s").unwrap();

        temp_env::with_var("DROVER_TEST_TOKEN", Some("s3cret"), || {
            let release = swarm.release_config().unwrap();
            assert_eq!(release.env["MODE"], "live");
            assert_eq!(release.env["TOKEN"], "s3cret");
        });
    }
}
