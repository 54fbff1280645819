mod common;

#[cfg(test)]
mod versions {
    use crate::common::*;
    use sidetree_core::config::{Config, ProtocolParameters, ProtocolVersionConfig};
    use sidetree_core::request_handler::ResponseStatus;
    use sidetree_core::{Collaborators, Core, ErrorCode};
    use std::fs;
    use tempfile::tempdir;

    fn two_versions() -> Vec<ProtocolVersionConfig> {
        vec![
            ProtocolVersionConfig { start_time: 0, version: "1.0".to_string(), parameters: ProtocolParameters::default() },
            ProtocolVersionConfig {
                start_time: 100,
                version: "1.0".to_string(),
                parameters: ProtocolParameters { max_delta_size_in_bytes: 50, ..Default::default() },
            },
        ]
    }

    #[tokio::test]
    async fn test_requests_use_version_of_current_ledger_time() {
        let node = node_with(Config::default(), two_versions());
        let early = create(1, 2, "early");
        assert_eq!(node.core.handle_operation_request(&early.buffer).await.status, ResponseStatus::Succeeded);
        node.core.trigger_batch_writing().await.unwrap();

        // From time 100 on, deltas may be at most 50 bytes
        node.ledger.set_time(100).await;
        let late = node.core.handle_operation_request(&create(3, 4, "late").buffer).await;
        assert_eq!(late.status, ResponseStatus::BadRequest);
        assert_eq!(late.body.unwrap()["code"], ErrorCode::OperationDeltaExceedsMaxSize.as_str());

        // The time-0 transaction is still processed under the rules of time 0
        node.core.trigger_process_transactions().await.unwrap();
        assert_eq!(node.core.handle_resolve_request(&did(&early.did_suffix)).await.status, ResponseStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_ledger_time_before_first_version_is_a_configuration_error() {
        let mut versions = versions();
        versions[0].start_time = 10;
        let node = node_with(Config::default(), versions);
        let response = node.core.handle_operation_request(&create(1, 2, "first").buffer).await;
        assert_eq!(response.status, ResponseStatus::ServerError);
        assert_eq!(response.body.unwrap()["code"], ErrorCode::VersionNotFoundForTime.as_str());
    }

    #[test]
    fn test_unknown_version_blocks_startup() {
        let versions = vec![ProtocolVersionConfig { start_time: 0, version: "0.1".to_string(), parameters: Default::default() }];
        assert!(Core::new(Config::default(), &versions, Collaborators::in_memory()).is_err());
        assert!(Core::new(Config::default(), &[], Collaborators::in_memory()).is_err());
    }

    #[test]
    fn test_loads_config_and_versions_from_files() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        let versions_path = dir.path().join("versions.json");
        fs::write(&config_path, r#"{"did_method_name": "ion", "max_concurrent_downloads": 4}"#).unwrap();
        fs::write(
            &versions_path,
            r#"[{"start_time": 0, "version": "1.0"}, {"start_time": 500, "version": "1.0", "parameters": {"max_operations_per_batch": 5}}]"#,
        )
        .unwrap();

        let config = Config::from_file(&config_path).unwrap();
        assert_eq!(config.did_method_name, "ion");
        let versions = ProtocolVersionConfig::list_from_file(&versions_path).unwrap();
        assert_eq!(versions[1].parameters.max_operations_per_batch, 5);
        assert_eq!(versions[1].parameters.max_delta_size_in_bytes, 1_000);

        let core = Core::new(config, &versions, Collaborators::in_memory()).unwrap();
        assert_eq!(core.versions().components_for(499).unwrap().start_time, 0);
        assert_eq!(core.versions().components_for(500).unwrap().parameters.max_operations_per_batch, 5);

        fs::write(&config_path, r#"{"did_method_name": "bad:name"}"#).unwrap();
        assert!(Config::from_file(&config_path).is_err());
    }
}
