use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use reqwest::Client;

use pvgrid::backend::{parse_base, HttpBackend};
use pvgrid::charts::{ChartWidgetSet, OptionsFileFactory};
use pvgrid::config::{AssetMode, Config};
use pvgrid::loader::{default_assets, AssetSource, EmbeddedAssetSource, FsAssetSource, HttpAssetSource, ScriptLoader};
use pvgrid::logging::{log, obj, v_str, Domain, Level};
use pvgrid::messages::LogSink;
use pvgrid::params::{MemoryPanel, ParameterPanel, ParameterSet};
use pvgrid::sync::SyncController;

const USAGE: &str = "usage: pvgrid start | refresh [field=value ...] | export-assets <dir>";

fn asset_source(cfg: &Config, client: &Client) -> Result<Box<dyn AssetSource>> {
    Ok(match &cfg.assets {
        AssetMode::Embedded => Box::new(EmbeddedAssetSource::new()),
        AssetMode::Dir(dir) => Box::new(FsAssetSource::new(dir.clone())),
        AssetMode::Http => Box::new(HttpAssetSource::new(client.clone(), parse_base(&cfg.backend_url)?)),
    })
}

fn build(cfg: &Config) -> Result<SyncController<MemoryPanel>> {
    let client = Client::builder().timeout(cfg.timeout()).build()?;
    let loader = ScriptLoader::new(asset_source(cfg, &client)?);
    let widgets = ChartWidgetSet::new(Box::new(OptionsFileFactory::new(cfg.out_dir.clone())?));
    Ok(SyncController::new(
        Box::new(HttpBackend::from_config(cfg, client)?),
        loader,
        default_assets(cfg.contract),
        widgets,
        MemoryPanel::new(),
        Arc::new(LogSink),
    ))
}

fn print_panel(params: &ParameterSet) {
    for (field, value) in params.iter() {
        println!("{:<16}{}", field.as_str(), value);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cfg = Config::from_env();
    log(
        Level::Info,
        Domain::System,
        "starting",
        obj(&[
            ("backend", v_str(&cfg.backend_url)),
            ("contract", v_str(cfg.contract.as_str())),
            ("out_dir", v_str(&cfg.out_dir.to_string_lossy())),
        ]),
    );

    match args.first().map(String::as_str) {
        Some("start") => {
            let controller = build(&cfg)?;
            controller.startup().await?;
            print_panel(&controller.with_panel(|p| p.read_all())?);
        }
        Some("refresh") => {
            let controller = build(&cfg)?;
            controller.startup().await?;
            let mut edited = controller.with_panel(|p| p.read_all())?;
            for assignment in &args[1..] {
                edited.parse_assignment(assignment)?;
            }
            controller.with_panel(|p| {
                for (field, value) in edited.iter() {
                    p.edit(field, value);
                }
            })?;
            controller.refresh().await?;
            print_panel(&edited);
        }
        Some("export-assets") => {
            let Some(dir) = args.get(1) else {
                bail!(USAGE);
            };
            for path in EmbeddedAssetSource::new().export(Path::new(dir))? {
                println!("{}", path.display());
            }
        }
        _ => bail!(USAGE),
    }

    Ok(())
}
