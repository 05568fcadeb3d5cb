use anyhow::{Context, Result};
use cads_api_client::{ApiClient, ListQuery};
use serde_json::json;
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // RUST_LOG=cads_api_client=debug shows every request and reply.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();

    // Configure authentication via env vars or a `.cadsapirc` file.
    let client = ApiClient::from_env()?;
    client
        .check_authentication()
        .context("the configured key was rejected")?;

    let page = client.get_collections(&ListQuery::new().limit(5))?;
    for id in page.collection_ids() {
        println!("collection: {}", id);
    }

    let collection_id = "reanalysis-era5-single-levels";
    let collection = client.get_collection(collection_id)?;
    println!(
        "{}: {:?} .. {:?}",
        collection.id(),
        collection.begin_datetime(),
        collection.end_datetime()
    );

    let request = json!({
        "product_type": ["reanalysis"],
        "variable": ["2m_temperature"],
        "year": ["2024"],
        "month": ["03"],
        "day": ["01"],
        "time": ["13:00"],
        "data_format": "grib"
    });

    let costs = client.estimate_costs(collection_id, &request)?;
    println!("estimated costs: {}", costs);

    let remote = collection.submit(&request)?;
    println!("request uid: {}", remote.request_uid());

    let results = remote.wait_on_results()?;
    let path = results.download(Some(Path::new("era5_2m_temperature.grib")))?;
    println!("downloaded {}", path.display());
    Ok(())
}
