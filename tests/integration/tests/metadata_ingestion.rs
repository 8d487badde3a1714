//! Metadata ingestion across inline, file and remote sources.

use std::sync::Arc;
use std::time::Duration;

use kc_core::MetadataFetchConfig;
use kc_protocol_saml::{EntityCatalog, MetadataIngester, SamlBinding};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{self, Party};

fn fast_fetch() -> MetadataFetchConfig {
    MetadataFetchConfig {
        fetch_timeout_secs: 5,
        initial_backoff_ms: 20,
        max_backoff_secs: 1,
        max_fetch_attempts: 6,
        ..MetadataFetchConfig::default()
    }
}

async fn wait_for(catalog: &EntityCatalog, entity_id: &str) -> anyhow::Result<()> {
    tokio::time::timeout(Duration::from_secs(10), async {
        while catalog.lookup(entity_id).is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;
    Ok(())
}

#[tokio::test]
async fn remote_source_recovers_after_service_unavailable() -> anyhow::Result<()> {
    common::init_tracing();
    let sp = Party::generate("https://sp.example.org")?;

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metadata"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(3)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/metadata"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(sp.metadata(SamlBinding::HttpRedirect.uri())),
        )
        .with_priority(2)
        .mount(&server)
        .await;

    let catalog = Arc::new(EntityCatalog::new());
    let ingester = MetadataIngester::new(fast_fetch(), common::clock(), catalog.upsert_callback())?;
    let handle = ingester.ingest_configured(&[format!("{}/metadata", server.uri())])?;

    // Submission does not wait for the fetch.
    assert!(catalog.lookup(&sp.entity_id).is_none());

    wait_for(&catalog, &sp.entity_id).await?;
    handle.wait().await;

    let record = catalog.lookup(&sp.entity_id).expect("entity ingested");
    assert_eq!(
        record.single_logout_service.as_ref().map(|e| e.location.as_str()),
        Some(sp.slo_url.as_str())
    );
    assert_eq!(record.signing_certificate()?.to_base64(), sp.certificate_b64());

    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 4);
    Ok(())
}

#[tokio::test]
async fn inline_and_directory_sources_load_before_returning() -> anyhow::Result<()> {
    common::init_tracing();
    let idp = Party::generate("https://idp.example.org")?;
    let sp = Party::generate("https://sp.example.org")?;
    let other = Party::generate("https://other.example.org")?;

    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("a-sp.xml"), sp.metadata(SamlBinding::HttpPost.uri()))?;
    std::fs::write(dir.path().join("b-broken.xml"), "<md:EntityDescriptor")?;
    std::fs::write(dir.path().join("c-other.xml"), other.metadata(SamlBinding::HttpRedirect.uri()))?;

    let catalog = Arc::new(EntityCatalog::new());
    let ingester = MetadataIngester::new(fast_fetch(), common::clock(), catalog.upsert_callback())?;
    let handle = ingester.ingest_configured(&[
        idp.metadata(SamlBinding::HttpRedirect.uri()),
        format!("file:{}", dir.path().display()),
    ])?;

    assert_eq!(handle.pending(), 0);
    assert_eq!(catalog.len(), 3);
    let sp_record = catalog.lookup(&sp.entity_id).expect("sp ingested");
    assert_eq!(
        sp_record.single_logout_service.as_ref().map(|e| e.binding),
        Some(SamlBinding::HttpPost)
    );
    Ok(())
}

#[tokio::test]
async fn reingestion_replaces_the_whole_record() -> anyhow::Result<()> {
    common::init_tracing();
    let first = Party::generate("https://sp.example.org")?;
    let rotated = Party::generate("https://sp.example.org")?
        .with_slo_url("https://sp.example.org/logout/v2");

    let catalog = Arc::new(EntityCatalog::new());
    let ingester = MetadataIngester::new(fast_fetch(), common::clock(), catalog.upsert_callback())?;
    ingester.ingest_configured(&[first.metadata(SamlBinding::HttpRedirect.uri())])?;
    ingester.ingest_configured(&[rotated.metadata(SamlBinding::HttpPost.uri())])?;

    let record = catalog.lookup(&first.entity_id).expect("entity present");
    assert_eq!(record.signing_certificate()?.to_base64(), rotated.certificate_b64());
    let endpoint = record.single_logout_service.clone().expect("endpoint");
    assert_eq!(endpoint.location, "https://sp.example.org/logout/v2");
    assert_eq!(endpoint.binding, SamlBinding::HttpPost);
    Ok(())
}
