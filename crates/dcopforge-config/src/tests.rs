//! Tests for agent and run configuration.

use super::*;

#[test]
fn test_defaults() {
    let config = DcopConfig::default();
    assert_eq!(config.agent.modules.len(), 4);
    assert_eq!(config.agent.transport, TransportKind::InProcess);
    assert_eq!(config.agent.util_mode, UtilMode::Eager);
    assert!(config.agent.measure_messages);
    assert_eq!(config.run.timeout(), Duration::from_secs(600));
    assert_eq!(config.run.deployment, Deployment::Local);
    config.validate().unwrap();
}

#[test]
fn test_toml_parsing() {
    let toml = r#"
        [run]
        timeout_secs = 12
        stop_grace_millis = 50

        [run.deployment]
        type = "distributed"
        daemons = ["10.0.0.1:4000", "10.0.0.2:4000"]

        [agent]
        transport = "tcp"

        [[agent.modules]]
        type = "election"

        [[agent.modules]]
        type = "pseudotree"

        [[agent.modules]]
        type = "util_propagation"

        [agent.util_mode]
        type = "pull"

        [agent.messages]
        "util_propagation.UTIL" = 900
    "#;

    let config = DcopConfig::from_toml_str(toml).unwrap();
    config.validate().unwrap();
    assert_eq!(config.run.timeout_secs, 12);
    assert_eq!(config.run.stop_grace(), Duration::from_millis(50));
    assert_eq!(config.agent.modules.len(), 3);
    assert_eq!(
        config.agent.util_mode,
        UtilMode::Pull {
            policy: AskPolicyConfig::Chunked { chunk_size: 64 }
        }
    );
    let table = config.agent.message_table().unwrap();
    assert_eq!(table.tag(MessageKind::Util), Some(900));
    assert_eq!(table.kind(900), Some(MessageKind::Util));
}

#[test]
fn test_yaml_parsing() {
    let yaml = r#"
        run:
          timeout_secs: 5
        agent:
          measure_time: true
          message_costs:
            default_cost: 3
            check_cost: 1
            per_kind:
              util_propagation.UTIL: 10
          util_mode:
            type: pull
            policy:
              type: whole
    "#;

    let config = DcopConfig::from_yaml_str(yaml).unwrap();
    config.validate().unwrap();
    assert!(config.agent.measure_time);
    assert_eq!(config.agent.message_costs.cost_of(MessageKind::Util), 10);
    assert_eq!(config.agent.message_costs.cost_of(MessageKind::Value), 3);
    assert_eq!(
        config.agent.util_mode,
        UtilMode::Pull {
            policy: AskPolicyConfig::Whole
        }
    );
}

#[test]
fn test_builder() {
    let config = DcopConfig::new()
        .with_timeout_secs(9)
        .with_util_mode(UtilMode::Pull {
            policy: AskPolicyConfig::Whole,
        })
        .with_daemons(["127.0.0.1:7000"]);
    assert_eq!(config.run.timeout_secs, 9);
    assert_eq!(config.agent.transport, TransportKind::Tcp);
    config.validate().unwrap();
}

#[test]
fn test_simulated_time_requires_in_process() {
    let config = DcopConfig::new()
        .with_simulated_time(true)
        .with_transport(TransportKind::Tcp);
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("simulated time"));
}

#[test]
fn test_distributed_requires_tcp_and_daemons() {
    let mut config = DcopConfig::new().with_daemons(Vec::<String>::new());
    assert!(config.validate().is_err());

    config.run.deployment = Deployment::Distributed {
        daemons: vec!["127.0.0.1:1".to_string()],
    };
    config.agent.transport = TransportKind::InProcess;
    assert!(config.validate().is_err());
}

#[test]
fn test_module_order_is_checked() {
    let mut agent = AgentConfig {
        modules: vec![ModuleConfig::Pseudotree, ModuleConfig::Election],
        ..AgentConfig::default()
    };
    assert!(agent.validate().is_err());

    agent.modules = vec![ModuleConfig::Election, ModuleConfig::Election];
    assert!(agent.validate().is_err());

    agent.modules = vec![];
    assert!(agent.validate().is_err());
}

#[test]
fn test_message_table_rejects_bad_overrides() {
    let unknown: BTreeMap<String, u16> = [("util_propagation.NOPE".to_string(), 1)].into();
    assert!(MessageTable::resolve(&unknown).is_err());

    let orchestration: BTreeMap<String, u16> =
        [("orchestration.START".to_string(), 999)].into();
    assert!(MessageTable::resolve(&orchestration).is_err());

    let collision: BTreeMap<String, u16> = [
        ("util_propagation.UTIL".to_string(), 500),
        ("value_propagation.VALUE".to_string(), 500),
    ]
    .into();
    let err = MessageTable::resolve(&collision).unwrap_err();
    assert!(err.to_string().contains("500"));
}

#[test]
fn test_zero_chunk_size_is_rejected() {
    let config = DcopConfig::new().with_util_mode(UtilMode::Pull {
        policy: AskPolicyConfig::Chunked { chunk_size: 0 },
    });
    assert!(config.validate().is_err());
}

#[test]
fn test_agent_config_toml_round_trip_for_daemons() {
    let agent = AgentConfig {
        util_mode: UtilMode::Pull {
            policy: AskPolicyConfig::Chunked { chunk_size: 3 },
        },
        messages: [("value_propagation.VALUE".to_string(), 4242)].into(),
        ..AgentConfig::default()
    };
    let shipped = agent.to_toml_string().unwrap();
    assert_eq!(AgentConfig::from_toml_str(&shipped).unwrap(), agent);
}

#[test]
fn test_config_error_converts() {
    let err: DcopError = ConfigError::Invalid("broken".to_string()).into();
    assert!(matches!(err, DcopError::Configuration(_)));
}
