use std::env;

use anyhow::Result;
use sapmon_azure_storage::{
    metrics_filter, AccountCache, AnalyticsReconciler, Config, DefaultAccountProvider, DiskSizer,
    EventualConsistencyPoller, StorageManagementClient, TableFilter, METRICS_TABLE_PREFIX,
};
use sapmon_core::{Context, OsEnv};
use sapmon_http_send_reqwest::ReqwestHttpSend;

/// Verify the monitoring storage of one VM.
///
/// ```shell
/// AZURE_STORAGE_ACCOUNT=sapmonacct AZURE_STORAGE_KEY=... \
///     cargo run --example verify_storage -- sapmonacct /subscriptions/.../virtualMachines/sapvm \
///     https://sapmonacct.blob.core.windows.net/vhds/sapvm-os.vhd
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let _ = env_logger::builder().try_init();

    let mut args = env::args().skip(1);
    let (Some(account_name), Some(resource_id)) = (args.next(), args.next()) else {
        eprintln!("usage: verify_storage <account> <vm resource id> [disk blob uri...]");
        return Ok(());
    };
    let disks: Vec<String> = args.collect();

    let ctx = Context::new()
        .with_http_send(ReqwestHttpSend::try_new()?)
        .with_env(OsEnv);
    let config = Config::default().from_env(&ctx)?;

    let cache = AccountCache::new(DefaultAccountProvider::from_env(&ctx), &config);
    let account = cache.resolve(&ctx, &account_name).await?;
    println!("storage account: {account:?}");

    let client = StorageManagementClient::new(ctx.clone(), &config);

    let outcome = AnalyticsReconciler::new(client.clone())
        .ensure_enabled(&account)
        .await?;
    println!("storage analytics: {outcome:?}");

    let since = chrono::Utc::now() - chrono::TimeDelta::try_minutes(10).expect("in bounds");
    let filter = TableFilter::prefix(METRICS_TABLE_PREFIX, metrics_filter(&resource_id, since));
    let poller = EventualConsistencyPoller::new(client.clone(), config.poller_config());
    let outcome = poller.wait_for_row(&account, &filter).await?;
    if outcome.matched {
        println!("metrics found after {:?}", outcome.elapsed);
    } else {
        println!("no metrics after {:?}", outcome.elapsed);
    }

    let sizer = DiskSizer::new(client);
    for disk in disks {
        match sizer.tier(&account, &disk, None).await {
            Ok(tier) => println!("{disk}: {tier}"),
            Err(err) => println!("{disk}: {err}"),
        }
    }

    Ok(())
}
