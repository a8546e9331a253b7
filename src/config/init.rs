// ABOUTME: Config scaffolding for new fleets.
// ABOUTME: Creates a commented drover.yml template.

use std::path::Path;

use crate::error::{Error, Result};

use super::CONFIG_FILENAME;

pub fn init_config(dir: &Path, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    std::fs::write(&config_path, TEMPLATE)?;
    Ok(())
}

const TEMPLATE: &str = r#"hosts:
  - deploy@web1.example.com
  - name: web2.example.com
    ports: "5000-5999"

apps:
  myapp:
    repo_url: https://git.example.com/myapp.git

balancers:
  main: http://lb.example.com:8080

remote:
  user: deploy
  # SSH host key verification (default: false)
  # Set to true to enable Trust-On-First-Use, or pre-populate ~/.ssh/known_hosts
  # trust_first_connection: true

timeouts:
  deploy: 10m
  uptest: 2m

swarms:
  - id: myapp-web
    app: myapp
    version: v1.0.0
    proc: web
    config_name: prod
    size: 2
    pool:
      balancer: main
      name: myapp-prod
    env:
      LOG_LEVEL: info
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FleetConfig;

    #[test]
    fn template_parses() {
        let config = FleetConfig::from_yaml(TEMPLATE).unwrap();
        assert_eq!(config.hosts.len(), 2);
        assert_eq!(config.swarms.len(), 1);
        assert_eq!(config.hosts.first().user.as_deref(), Some("deploy"));
    }
}
