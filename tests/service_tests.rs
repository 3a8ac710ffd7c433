//! End-to-end behavior of the disassembly service over fake collaborators.

mod common;

use std::sync::Arc;

use common::{
    coordinator_with, sample_output, service_with, wrapped_ether, FakeChain, FakeEngine,
    FakeSignatures, ADDRESS, OTHER_ADDRESS, SENT, SENT_TOPIC,
};
use ctrleth::coordinator::StartState;
use ctrleth::service::{DisassemblyService, LoadResponse};
use ctrleth_cache::{MemoryCache, MemoryDocumentStore};
use ctrleth_types::encoding::format_hex;
use ctrleth_types::{Annotation, BlockType, FullResult, JumpEdge, TaskError};

const TRANSFER: &str = "transfer(address,uint256)";
const TRANSFER_SELECTOR: &str = "0xa9059cbb";

fn service(engine: FakeEngine, chain: Arc<FakeChain>, signatures: FakeSignatures) -> DisassemblyService {
    let coordinator = coordinator_with(
        Arc::new(engine),
        Arc::new(MemoryCache::new()),
        Arc::new(MemoryDocumentStore::new()),
        2,
    );
    service_with(coordinator, chain, Arc::new(signatures))
}

fn weth_chain() -> Arc<FakeChain> {
    Arc::new(FakeChain::contract().with_storage(0, wrapped_ether()))
}

fn sent_signatures() -> FakeSignatures {
    FakeSignatures::default()
        .with_event(SENT_TOPIC, &[SENT])
        .with_function(TRANSFER_SELECTOR, &[TRANSFER, "many_msg_babbage(bytes1)"])
}

fn ready(response: LoadResponse) -> FullResult {
    match response {
        LoadResponse::Ready(result) => *result,
        other => panic!("expected a finished analysis, got {:?}", other),
    }
}

async fn analyzed(service: &DisassemblyService) -> FullResult {
    let args = service.engine_defaults().clone();
    assert_eq!(service.start_analysis(ADDRESS, args).unwrap(), StartState::Queued);
    ready(service.wait_and_load(ADDRESS).await.unwrap())
}

#[tokio::test]
async fn test_full_pipeline() {
    let service = service(
        FakeEngine::returning(sample_output()),
        weth_chain(),
        sent_signatures(),
    );
    let result = analyzed(&service).await;

    assert_eq!(result.blocks.len(), 3);
    assert_eq!(
        result.blocks[0].types,
        vec![BlockType::StorageReads, BlockType::Push]
    );
    assert_eq!(result.blocks[1].types, vec![BlockType::Logs]);
    assert_eq!(result.blocks[2].types, vec![BlockType::Selfdestruct]);
    assert_eq!(result.blocks[0].function, None);
    assert_eq!(result.blocks[2].function.as_deref(), Some("kill()"));

    let load = result.blocks[0].instructions[1]
        .annotations
        .iter()
        .find_map(|a| match a {
            Annotation::StorageLoad(load) => Some(load),
            _ => None,
        })
        .expect("SLOAD carries its storage read");
    assert_eq!(load.concrete_value, Some(format_hex(&wrapped_ether())));
    assert_eq!(load.concrete_value_text.as_deref(), Some("Wrapped Ether"));

    let log = result.blocks[1].instructions[0]
        .annotations
        .iter()
        .find_map(|a| match a {
            Annotation::Log(log) => Some(log),
            _ => None,
        })
        .expect("LOG1 carries its log fact");
    assert_eq!(log.name.as_deref(), Some(SENT));

    assert!(result.links.contains(&JumpEdge::unconditional(0, 2)));
    assert!(result.links.contains(&JumpEdge::conditional(0, 4, false)));
    assert_eq!(result.links.len(), 2);

    assert_eq!(result.functions.len(), 1);
    let entrypoint = result.functions[0].entrypoint.as_ref().unwrap();
    assert_eq!(entrypoint.block, 2);
    assert_eq!(entrypoint.function_name, "kill()");

    assert!((result.coverage.assembly - 6.0 / 7.0).abs() < 1e-9);
    assert!((result.coverage.symbolic - 4.0 / 7.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_load_before_start_reports_not_started() {
    let service = service(
        FakeEngine::returning(sample_output()),
        weth_chain(),
        FakeSignatures::default(),
    );
    let response = service.load_analysis(ADDRESS).unwrap();
    assert_eq!(response, LoadResponse::not_started());
    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        serde_json::json!({"state": "notStarted"})
    );
}

#[tokio::test]
async fn test_malformed_address_is_rejected() {
    let engine = FakeEngine::returning(sample_output());
    let service = service(engine, weth_chain(), FakeSignatures::default());

    for address in ["0x1234", "not an address", ""] {
        let err = service.load_analysis(address).unwrap_err();
        assert_eq!(err.status, 400, "address {:?}", address);
        let err = service
            .start_analysis(address, service.engine_defaults().clone())
            .unwrap_err();
        assert_eq!(err.status, 400, "address {:?}", address);
    }
    assert!(service.tasks().is_empty());
}

#[tokio::test]
async fn test_account_without_code() {
    let empty = service(
        FakeEngine::returning(sample_output()),
        Arc::new(FakeChain::with_code(Some("0x"))),
        FakeSignatures::default(),
    );
    let err = empty.load_analysis(ADDRESS).unwrap_err();
    assert_eq!(err.status, 404);
    assert_eq!(err.message, "No bytecode at address");

    let unknown = service(
        FakeEngine::returning(sample_output()),
        Arc::new(FakeChain::with_code(None)),
        FakeSignatures::default(),
    );
    let err = unknown.load_analysis(ADDRESS).unwrap_err();
    assert_eq!(err.status, 400);
    assert_eq!(err.message, "Not a valid address");
}

#[tokio::test]
async fn test_failed_analysis_surfaces_envelope() {
    let service = service(
        FakeEngine::failing_with(TaskError::bad_input("Address input is not a contract address")),
        weth_chain(),
        FakeSignatures::default(),
    );
    service
        .start_analysis(ADDRESS, service.engine_defaults().clone())
        .unwrap();

    let err = service.wait_and_load(ADDRESS).await.unwrap_err();
    assert_eq!(err.status, 400);
    assert_eq!(err.message, "Address input is not a contract address");

    // Cached envelopes are served again without a new run.
    let again = service.load_analysis(ADDRESS).unwrap_err();
    assert_eq!(again, err);
}

#[tokio::test]
async fn test_enrichment_runs_on_every_read() {
    let chain = weth_chain();
    let service = service(
        FakeEngine::returning(sample_output()),
        chain.clone(),
        sent_signatures(),
    );
    let first = analyzed(&service).await;
    assert_eq!(chain.storage_calls(), 1);

    let second = ready(service.load_analysis(ADDRESS).unwrap());
    assert_eq!(chain.storage_calls(), 2);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_unresolved_storage_is_left_bare() {
    let service = service(
        FakeEngine::returning(sample_output()),
        Arc::new(FakeChain::contract()),
        FakeSignatures::default(),
    );
    let result = analyzed(&service).await;

    let load = result.blocks[0].instructions[1]
        .annotations
        .iter()
        .find_map(|a| match a {
            Annotation::StorageLoad(load) => Some(load),
            _ => None,
        })
        .unwrap();
    assert_eq!(load.concrete_value, None);
    assert_eq!(load.concrete_value_text, None);

    let log_named = result.blocks[1].instructions[0]
        .annotations
        .iter()
        .any(|a| matches!(a, Annotation::Log(log) if log.name.is_some()));
    assert!(!log_named);
}

#[tokio::test]
async fn test_storage_lookup() {
    let service = service(
        FakeEngine::returning(sample_output()),
        weth_chain(),
        FakeSignatures::default(),
    );

    assert_eq!(
        service.storage_lookup(ADDRESS, "0").unwrap(),
        format_hex(&wrapped_ether())
    );
    assert_eq!(
        service.storage_lookup(ADDRESS, "0x0").unwrap(),
        format_hex(&wrapped_ether())
    );

    let missing = service.storage_lookup(ADDRESS, "").unwrap_err();
    assert_eq!(missing.status, 400);
    assert_eq!(missing.message, "Slot parameter missing");

    let invalid = service.storage_lookup(ADDRESS, "zz").unwrap_err();
    assert_eq!(invalid.status, 400);
    assert_eq!(invalid.message, "Invalid value given");

    let unknown = service.storage_lookup(ADDRESS, "5").unwrap_err();
    assert_eq!(unknown.status, 404);
    assert_eq!(unknown.message, "Could not resolve storage of contract");

    assert_eq!(service.storage_lookup("0x12", "0").unwrap_err().status, 400);
}

#[tokio::test]
async fn test_signature_lookups() {
    let service = service(
        FakeEngine::returning(sample_output()),
        weth_chain(),
        sent_signatures(),
    );

    assert_eq!(service.event_lookup(SENT_TOPIC).unwrap(), SENT);
    assert_eq!(
        service.function_lookup(TRANSFER_SELECTOR).unwrap(),
        format!("{} or many_msg_babbage(bytes1)", TRANSFER)
    );
    // 0xa9059cbb in decimal.
    assert_eq!(
        service.function_lookup("2835717307").unwrap(),
        format!("{} or many_msg_babbage(bytes1)", TRANSFER)
    );

    let unknown = service.function_lookup("0x12345678").unwrap_err();
    assert_eq!(unknown.status, 404);
    assert_eq!(unknown.message, "Could not retrieve signature");
    assert_eq!(service.event_lookup("0x01").unwrap_err().status, 404);

    assert_eq!(service.function_lookup("0x1234567890").unwrap_err().status, 400);
    assert_eq!(service.event_lookup("not hex").unwrap_err().status, 400);
}

#[tokio::test]
async fn test_contracts_lists_finished_analyses() {
    let service = service(
        FakeEngine::returning(sample_output()),
        weth_chain(),
        FakeSignatures::default(),
    );
    assert!(service.contracts().unwrap().is_empty());

    analyzed(&service).await;
    service
        .start_analysis(OTHER_ADDRESS, service.engine_defaults().clone())
        .unwrap();
    service.wait_and_load(OTHER_ADDRESS).await.unwrap();

    assert_eq!(service.contracts().unwrap(), vec![OTHER_ADDRESS, ADDRESS]);
}
