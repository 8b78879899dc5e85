mod error;

use basketbot_config::Config;
use basketbot_store::models::{ClassChain, RetailSite, ScrapingRule};
use basketbot_store::{Database, Session, StaticProbe, defaults};
use clap::{Parser, Subcommand};
use exn::ResultExt;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::error::{ErrorKind, Result};

#[derive(Parser)]
#[command(name = "basketbot", version, about = "Basket price tracking and scraping rule management")]
struct Cli {
    /// Configuration file (.toml, .yaml or .json), merged over the user configuration.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database and seed the default DOM elements.
    Init,
    /// List regions with their current basket versions.
    Regions,
    /// Show the retail site a URL belongs to.
    Site {
        /// Any page of the site; the scheme may be omitted.
        url: String,
    },
    /// Show the scraping rule that applies to an item on the site of a URL.
    Rule { url: String, item: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:?}");
            ExitCode::FAILURE
        },
    }
}

fn init_tracing(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(std::io::Error::other)
        .or_raise(|| ErrorKind::Logging)
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    init_tracing(&config.log.level)?;
    debug!(?config, "configuration loaded");
    let dir = config.database_dir().or_raise(|| ErrorKind::Config)?;
    if !dir.as_os_str().is_empty() {
        std::fs::create_dir_all(dir).or_raise(|| ErrorKind::Io)?;
    }
    let db = Database::connect(&config.database.path, Some(config.database.max_connections))
        .await
        .or_raise(|| ErrorKind::Store)?
        .with_initial_version(config.basket.initial_version);
    let probe = StaticProbe(config.sites.assume_https);
    let mut session = db.begin().await.or_raise(|| ErrorKind::Store)?;
    let result = match cli.command {
        Command::Init => init(&mut session, &config).await,
        Command::Regions => regions(&mut session).await,
        Command::Site { url } => site(&mut session, &url, &probe).await.map(|site| print_site(&site)),
        Command::Rule { url, item } => rule(&mut session, &url, &item, &probe).await,
    };
    match result {
        Ok(()) => session.commit().await.map(|_| ()).or_raise(|| ErrorKind::Store)?,
        Err(err) => {
            session.rollback().await.or_raise(|| ErrorKind::Store)?;
            db.close().await;
            return Err(err);
        },
    }
    db.close().await;
    Ok(())
}

async fn init(session: &mut Session, config: &Config) -> Result<()> {
    let elems = defaults::create(session).await.or_raise(|| ErrorKind::Store)?;
    info!(elems = elems.len(), "default DOM elements in place");
    println!("database ready at {}", config.database.path.display());
    Ok(())
}

async fn regions(session: &mut Session) -> Result<()> {
    for region in session.regions().await.or_raise(|| ErrorKind::Store)? {
        println!("{}\tversion {}\tsince {}", region.name, region.basket_version, region.basket_version_update_time);
    }
    Ok(())
}

async fn site(session: &mut Session, url: &str, probe: &StaticProbe) -> Result<RetailSite> {
    match session.resolve_site_by_url(url, probe).await.or_raise(|| ErrorKind::Store)? {
        Some(site) => Ok(site),
        None => exn::bail!(ErrorKind::NotFound(format!("no retail site matches {url}"))),
    }
}

fn print_site(site: &RetailSite) {
    println!("{} ({})", site.name, site.url.base_url());
    println!("basket version {}", site.basket_version);
    if let Some(basket_url) = &site.basket_url {
        println!("basket page {basket_url}");
    }
    println!("{} scraping rules, {} exceptions", site.scraping_rules.len(), site.exception_rules().len());
}

async fn rule(session: &mut Session, url: &str, item: &str, probe: &StaticProbe) -> Result<()> {
    let site = site(session, url, probe).await?;
    let Some(found) = session.item_by_name(item).await.or_raise(|| ErrorKind::Store)? else {
        exn::bail!(ErrorKind::NotFound(format!("no item named {item}")));
    };
    let Some(id) = found.id() else {
        exn::bail!(ErrorKind::NotFound(format!("no item named {item}")));
    };
    let rule = site.rule_for_item(id).or_raise(|| ErrorKind::Store)?;
    print_rule(&site, item, rule);
    Ok(())
}

fn print_rule(site: &RetailSite, item: &str, rule: &ScrapingRule) {
    let kind = if rule.default_rule { "default" } else { "exception" };
    println!("{item} on {}: {kind} rule #{}", site.name, rule.id);
    println!("anchor #{} (element {})", rule.parent_id, rule.parent_elem_id);
    if !rule.class_chain.is_empty() {
        println!("chain {}", describe_chain(&rule.class_chain));
    }
}

/// CSS-like rendering of a class chain, e.g. `div.product > span.price`.
fn describe_chain(chain: &ClassChain) -> String {
    chain
        .links()
        .iter()
        .map(|link| {
            let mut step = link.element_type.clone();
            for class in &link.classes {
                step.push('.');
                step.push_str(class);
            }
            step
        })
        .collect::<Vec<_>>()
        .join(" > ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use basketbot_store::models::ChainLink;

    #[test]
    fn test_describe_chain() {
        let chain = ClassChain::new([ChainLink::new("div", ["product", "main"]), ChainLink::new("b", Vec::<String>::new())]);
        assert_eq!(describe_chain(&chain), "div.product.main > b");
    }

    #[test]
    fn test_cli_parses_rule_command() {
        let cli = Cli::try_parse_from(["basketbot", "rule", "www.superstore.com", "apple", "-c", "bb.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("bb.toml")));
        assert!(matches!(cli.command, Command::Rule { ref url, ref item } if url == "www.superstore.com" && item == "apple"));
    }
}
