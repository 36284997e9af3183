// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use anyhow::Result;
use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use teleguide::api::XtreamClient;
use teleguide::catalog::{CatalogEntry, ContentType};
use teleguide::config::Config;
use teleguide::correlate::CorrelationResolver;
use teleguide::epg::{GuideCache, GuideStore};
use teleguide::navigation::Row;
use teleguide::search::SearchOverlay;
use teleguide::session::{GuideFetcher, LoginType, Session, SessionContext};

fn cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Green.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default())
}

#[derive(Parser)]
#[command(name = "teleguide")]
#[command(about = "Browse an Xtream catalog with program-guide annotations")]
#[command(version)]
#[command(styles = cargo_style())]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Provider name from the config file (case-insensitive)
    #[arg(short, long, global = true)]
    provider: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List top-level categories of a tab (live, movies, series)
    Categories {
        tab: String,
    },

    /// List the streams inside a category
    Streams {
        tab: String,
        category_id: String,
        /// Annotate live channels with what's on now
        #[arg(long)]
        epg: bool,
    },

    /// List the seasons of a series
    Seasons {
        category_id: String,
        series_id: u32,
    },

    /// List the episodes of one season
    Episodes {
        category_id: String,
        series_id: u32,
        season: u32,
    },

    /// Filter the current level by a search query
    Search {
        tab: String,
        query: String,
        /// Search inside a category instead of the category list
        #[arg(long)]
        category_id: Option<String>,
    },

    /// Print the playback URL for a stream or episode
    Url {
        tab: String,
        id: String,
        /// Container extension (default m3u8)
        #[arg(long)]
        extension: Option<String>,
    },

    /// Program-guide operations
    #[command(subcommand)]
    Epg(EpgCommands),
}

#[derive(Subcommand)]
enum EpgCommands {
    /// Drop the cache and fetch the guide feed again
    Refresh,
    /// Show what's on a channel, matched by id or name
    Now { channel: String },
}

fn connect(config: &Config, provider: Option<&str>) -> Result<XtreamClient> {
    let provider = config.select_provider(provider)?;
    Ok(XtreamClient::new(
        &provider.url,
        provider.username.clone(),
        provider.password.clone(),
        provider.method(),
        &config.http,
    )?)
}

async fn login(config: &Config, client: &XtreamClient, provider: Option<&str>) -> Result<SessionContext> {
    let provider = config.select_provider(provider)?;
    let session = Session {
        server: client.base_url().to_string(),
        username: provider.username.clone(),
        password: provider.password.clone(),
        login_type: LoginType::Xtream,
    };
    Ok(SessionContext::login(client, session, 1, &config.guide).await?)
}

fn guide_store(config: &Config) -> Result<GuideStore> {
    let cache = match &config.guide.cache_file {
        Some(path) => GuideCache::at(path.clone(), config.guide.cache_ttl_secs),
        None => GuideCache::new(config.guide.cache_ttl_secs)?,
    };
    Ok(GuideStore::new(cache))
}

/// Run the guide fetch as a background task and install the result, the
/// same path an interactive shell would use.
async fn load_guide(config: &Config, client: &XtreamClient, ctx: &mut SessionContext) -> Result<()> {
    let store = guide_store(config)?;
    let (tx, mut rx) = tokio::sync::mpsc::channel(1);
    let mut fetcher = GuideFetcher::new(config.guide.fetch_pool_size);
    fetcher.spawn(client.clone(), store, ctx.generation, tx);

    if let Some(update) = rx.recv().await {
        if let Err(e) = &update.result {
            eprintln!("Warning: guide fetch failed: {e}");
        }
        ctx.apply_guide_update(update);
    }
    Ok(())
}

fn print_rows(ctx: &SessionContext, rows: &[Row<'_>]) {
    let now = chrono::Local::now().fixed_offset();
    for row in rows {
        match row {
            Row::GoBack => {}
            Row::Placeholder(text) => println!("{text}"),
            Row::Item(CatalogEntry::Channel(stream)) => {
                let (label, _tooltip) = ctx.channel_label(stream, now);
                println!("{:6} | {}", stream.stream_id, label);
            }
            Row::Item(entry) => println!("{:6} | {}", entry.id(), entry.display_name()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env()
                    .add_directive(tracing::Level::DEBUG.into())
                    .add_directive("hyper_util=error".parse()?),
            )
            .init();
    } else if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive("hyper_util=error".parse()?),
            )
            .init();
    }

    let config = Config::load_or_default(Config::default_path());
    let provider = cli.provider.as_deref();

    match cli.command {
        Commands::Categories { tab } => {
            let tab: ContentType = tab.parse()?;
            let client = connect(&config, provider)?;
            let ctx = login(&config, &client, provider).await?;
            print_rows(&ctx, &ctx.visible_rows(tab));
        }

        Commands::Streams { tab, category_id, epg } => {
            let tab: ContentType = tab.parse()?;
            let client = connect(&config, provider)?;
            let mut ctx = login(&config, &client, provider).await?;
            if epg && tab == ContentType::Live {
                load_guide(&config, &client, &mut ctx).await?;
            }
            ctx.open_category(&client, tab, &category_id, 0).await?;
            print_rows(&ctx, &ctx.visible_rows(tab));
        }

        Commands::Seasons { category_id, series_id } => {
            let client = connect(&config, provider)?;
            let mut ctx = login(&config, &client, provider).await?;
            ctx.open_category(&client, ContentType::Series, &category_id, 0).await?;
            ctx.open_series(&client, series_id, 0).await?;
            print_rows(&ctx, &ctx.visible_rows(ContentType::Series));
        }

        Commands::Episodes { category_id, series_id, season } => {
            let client = connect(&config, provider)?;
            let mut ctx = login(&config, &client, provider).await?;
            ctx.open_category(&client, ContentType::Series, &category_id, 0).await?;
            ctx.open_series(&client, series_id, 0).await?;
            ctx.open_season(season, 0)?;
            print_rows(&ctx, &ctx.visible_rows(ContentType::Series));
        }

        Commands::Search { tab, query, category_id } => {
            let tab: ContentType = tab.parse()?;
            let client = connect(&config, provider)?;
            let mut ctx = login(&config, &client, provider).await?;
            if let Some(category_id) = category_id {
                ctx.open_category(&client, tab, &category_id, 0).await?;
            }
            let mut overlay = SearchOverlay::new();
            overlay.set_query(query);
            let rows = overlay.apply(ctx.visible_rows(tab));
            print_rows(&ctx, &rows);
        }

        Commands::Url { tab, id, extension } => {
            let tab: ContentType = tab.parse()?;
            let client = connect(&config, provider)?;
            let url = match tab {
                ContentType::Series => client.episode_url(&id, extension.as_deref()),
                _ => client.stream_url(tab, id.parse()?, extension.as_deref()),
            };
            println!("{url}");
        }

        Commands::Epg(EpgCommands::Refresh) => {
            let client = connect(&config, provider)?;
            let store = guide_store(&config)?;
            store.cache().invalidate();
            let index = store.fetch(&client).await?;
            println!(
                "Guide refreshed: {} channels, {} programs",
                index.names.len(),
                index.program_count()
            );
        }

        Commands::Epg(EpgCommands::Now { channel }) => {
            let client = connect(&config, provider)?;
            let store = guide_store(&config)?;
            let index = store.fetch(&client).await?;

            let resolver = CorrelationResolver::new(config.guide.match_threshold)
                .with_overrides(config.guide.id_overrides.clone());
            let entry = teleguide::catalog::Stream {
                name: channel.clone(),
                stream_id: 0,
                epg_channel_id: Some(channel.trim().to_lowercase()),
                category_id: None,
                container_extension: None,
            };

            let now = chrono::Local::now().fixed_offset();
            let annotation = resolver.annotate(&entry, &index, now);
            println!("{channel}: {}", annotation.label);
            if let Some(tooltip) = annotation.tooltip {
                println!("  {tooltip}");
            }
        }
    }

    Ok(())
}
