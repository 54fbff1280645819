mod common;

#[cfg(test)]
mod end_to_end {
    use crate::common::*;
    use sidetree_core::request_handler::ResponseStatus;
    use sidetree_core::resolver::Resolution;

    #[tokio::test]
    async fn test_create_update_and_reused_reveal() {
        let node = node();

        // 1. Create with recovery key 1 and update key 2
        let request = create(1, 2, "first");
        let created = submit_and_anchor(&node, &request.buffer).await;
        assert_eq!(key_ids(created.body.as_ref().unwrap()), vec!["first"]);

        let resolved = node.core.handle_resolve_request(&did(&request.did_suffix)).await;
        assert_eq!(resolved.status, ResponseStatus::Succeeded);
        let initial = resolved.body.unwrap();
        assert_eq!(key_ids(&initial), vec!["first"]);
        assert_eq!(initial["didDocument"]["id"], did(&request.did_suffix));

        // 2. Update revealing key 2, committing to key 3
        submit_and_anchor(&node, &update(&request.did_suffix, 2, 3, "second")).await;
        let after_update = node.core.handle_resolve_request(&did(&request.did_suffix)).await.body.unwrap();
        assert_eq!(key_ids(&after_update), vec!["first", "second"]);

        // 3. Reveal key 2 again: anchored, but excluded from replay
        submit_and_anchor(&node, &update(&request.did_suffix, 2, 4, "replayed")).await;
        let after_reuse = node.core.handle_resolve_request(&did(&request.did_suffix)).await.body.unwrap();
        assert_eq!(after_reuse, after_update);
        assert_eq!(node.ledger.transactions().await.len(), 3);
    }

    #[tokio::test]
    async fn test_update_recommitting_its_reveal_value_never_applies() {
        let node = node();
        let request = create(1, 2, "first");
        submit_and_anchor(&node, &request.buffer).await;
        let did = did(&request.did_suffix);

        // Commits to the very key it reveals; refused at the door
        let same_key = update(&request.did_suffix, 2, 2, "second");
        let refused = node.core.handle_operation_request(&same_key).await;
        assert_eq!(refused.status, ResponseStatus::BadRequest);
        assert_eq!(refused.body.unwrap()["code"], "commitment_mismatch");

        // Anchored by someone else, it is skipped during replay
        anchor_update_directly(&node, &same_key).await;
        node.core.trigger_process_transactions().await.unwrap();
        let resolved = node.core.handle_resolve_request(&did).await.body.unwrap();
        assert_eq!(key_ids(&resolved), vec!["first"]);

        // The chain still moves on with a fresh commitment, and the old bytes stay inert
        submit_and_anchor(&node, &update(&request.did_suffix, 2, 3, "third")).await;
        anchor_update_directly(&node, &same_key).await;
        node.core.trigger_process_transactions().await.unwrap();
        let resolved = node.core.handle_resolve_request(&did).await.body.unwrap();
        assert_eq!(key_ids(&resolved), vec!["first", "third"]);
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent() {
        let node = node();
        let request = create(1, 2, "first");
        submit_and_anchor(&node, &request.buffer).await;
        submit_and_anchor(&node, &update(&request.did_suffix, 2, 3, "second")).await;

        let first = node.core.handle_resolve_request(&did(&request.did_suffix)).await;
        let second = node.core.handle_resolve_request(&did(&request.did_suffix)).await;
        assert_eq!(serde_json::to_vec(&first).unwrap(), serde_json::to_vec(&second).unwrap());

        // Observing again changes nothing either
        node.core.trigger_process_transactions().await.unwrap();
        let third = node.core.handle_resolve_request(&did(&request.did_suffix)).await;
        assert_eq!(first, third);
    }

    #[tokio::test]
    async fn test_deactivate_is_terminal() {
        let node = node();
        let request = create(1, 2, "first");
        submit_and_anchor(&node, &request.buffer).await;
        submit_and_anchor(&node, &deactivate(&request.did_suffix, 1)).await;

        let response = node.core.handle_resolve_request(&did(&request.did_suffix)).await;
        assert_eq!(response.status, ResponseStatus::Deactivated);
        assert_eq!(response.body.as_ref().unwrap()["methodMetadata"]["deactivated"], true);

        // A correctly signed update and recover are both ignored afterwards
        submit_and_anchor(&node, &update(&request.did_suffix, 2, 3, "late")).await;
        submit_and_anchor(&node, &recover(&request.did_suffix, 1, 5, 6, "revived")).await;
        assert_eq!(node.core.handle_resolve_request(&did(&request.did_suffix)).await, response);
    }

    #[tokio::test]
    async fn test_recover_replaces_document_and_keys() {
        let node = node();
        let request = create(1, 2, "first");
        submit_and_anchor(&node, &request.buffer).await;
        submit_and_anchor(&node, &recover(&request.did_suffix, 1, 5, 6, "recovered")).await;

        let body = node.core.handle_resolve_request(&did(&request.did_suffix)).await.body.unwrap();
        assert_eq!(key_ids(&body), vec!["recovered"]);

        // The old update key no longer works; the new one does
        submit_and_anchor(&node, &update(&request.did_suffix, 2, 7, "stale")).await;
        submit_and_anchor(&node, &update(&request.did_suffix, 6, 7, "fresh")).await;
        let body = node.core.handle_resolve_request(&did(&request.did_suffix)).await.body.unwrap();
        assert_eq!(key_ids(&body), vec!["recovered", "fresh"]);
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_dids() {
        let node = node();
        let request = create(1, 2, "first");

        let missing = node.core.handle_resolve_request(&did(&request.did_suffix)).await;
        assert_eq!(missing.status, ResponseStatus::NotFound);
        assert_eq!(missing.body.unwrap()["code"], "did_not_found");

        let wrong_method = node.core.handle_resolve_request(&format!("did:other:{}", request.did_suffix)).await;
        assert_eq!(wrong_method.status, ResponseStatus::BadRequest);
        assert_eq!(node.core.handle_resolve_request("did:sidetree:").await.status, ResponseStatus::BadRequest);
    }

    #[tokio::test]
    async fn test_history_without_create_is_distinguished_from_missing() {
        let node = node();
        let request = create(1, 2, "first");

        // An update for a DID that was never created still gets anchored
        submit_and_anchor(&node, &update(&request.did_suffix, 2, 3, "orphan")).await;
        assert_eq!(
            node.core.resolver().resolve(&request.did_suffix).await.unwrap(),
            Resolution::NoValidHistory
        );
        let response = node.core.handle_resolve_request(&did(&request.did_suffix)).await;
        assert_eq!(response.status, ResponseStatus::NotFound);
        assert_eq!(response.body.unwrap()["code"], "did_has_no_valid_history");
    }

    #[tokio::test]
    async fn test_batch_with_every_operation_type() {
        let node = node();
        let a = create(1, 2, "a");
        let b = create(11, 12, "b");
        let c = create(21, 22, "c");
        for request in [&a, &b, &c] {
            node.core.handle_operation_request(&request.buffer).await;
        }
        node.core.trigger_batch_writing().await.unwrap();
        node.core.trigger_process_transactions().await.unwrap();

        // One update, one recover and one deactivate in the same batch
        for request in [update(&a.did_suffix, 2, 3, "a2"), recover(&b.did_suffix, 11, 13, 14, "b2"), deactivate(&c.did_suffix, 21)] {
            assert_eq!(node.core.handle_operation_request(&request).await.status, ResponseStatus::Succeeded);
        }
        assert_eq!(node.core.trigger_batch_writing().await.unwrap(), 3);
        node.core.trigger_process_transactions().await.unwrap();

        let resolve = |suffix: String| {
            let core = &node.core;
            async move { core.handle_resolve_request(&did(&suffix)).await }
        };
        assert_eq!(key_ids(&resolve(a.did_suffix.clone()).await.body.unwrap()), vec!["a", "a2"]);
        assert_eq!(key_ids(&resolve(b.did_suffix.clone()).await.body.unwrap()), vec!["b2"]);
        assert_eq!(resolve(c.did_suffix.clone()).await.status, ResponseStatus::Deactivated);
    }
}
