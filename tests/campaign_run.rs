//! Campaign-level runs: URL list in, metadata table out

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{Table, archive_url, leftover_files, serve_garbage, serve_tpf, test_config};
use tempfile::TempDir;
use tpf_harvest::campaign::{metadata_path, url_list_path};
use tpf_harvest::{CampaignOrchestrator, CampaignSelection, ConfigurationError, Error, MetadataRecord};
use wiremock::MockServer;

#[tokio::test]
async fn campaign_table_replaces_previous_output() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp, &server);
    std::fs::create_dir_all(&config.data_dir).unwrap();

    serve_tpf(&server, "c7/x.fits", 7001, &[1, 1, 1]).await;
    serve_garbage(&server, "c7/y.fits").await;
    serve_tpf(&server, "c7/z.fits", 7003, &[0, 1]).await;

    let list = format!(
        "{}\n\n   {}   \n{}\n",
        archive_url(&server, "c7/x.fits"),
        archive_url(&server, "c7/y.fits"),
        archive_url(&server, "c7/z.fits"),
    );
    std::fs::write(url_list_path(&config.data_dir, 7), list).unwrap();
    let output = metadata_path(&config.data_dir, 7);
    std::fs::write(&output, "old,rows\n1,2\n").unwrap();

    let orchestrator = CampaignOrchestrator::new(config.clone()).unwrap();
    let summary = orchestrator.run_campaign(7).await.unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.written, 2);
    assert_eq!(orchestrator.progress().processed(), 3);

    let table = Table::read(&output);
    assert_eq!(table.header, MetadataRecord::header_line());
    let mut npix = table.column("npix");
    npix.sort();
    assert_eq!(npix, vec!["1", "3"]);
    assert!(leftover_files(&config.scratch_dir).is_empty());
}

#[tokio::test]
async fn missing_url_list_fails_only_that_campaign() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp, &server);
    std::fs::create_dir_all(&config.data_dir).unwrap();

    serve_tpf(&server, "c0/a.fits", 1, &[1]).await;
    std::fs::write(
        url_list_path(&config.data_dir, 0),
        archive_url(&server, "c0/a.fits"),
    )
    .unwrap();

    let orchestrator = CampaignOrchestrator::new(config.clone()).unwrap();
    let results = orchestrator.run(CampaignSelection::All).await;

    assert_eq!(
        results.iter().map(|(c, _)| *c).collect::<Vec<_>>(),
        vec![0, 1, 2, 3, 4, 5]
    );
    assert_eq!(results[0].1.as_ref().unwrap().written, 1);
    for (_, result) in &results[1..] {
        let err = result.as_ref().unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::MissingUrlList { .. })
        ));
        assert_eq!(err.error_code(), "missing_url_list");
    }
    assert!(!metadata_path(&config.data_dir, 1).exists());
}
