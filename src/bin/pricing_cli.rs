use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use maintenance_pricing::{
    config::{self, AppConfig},
    db::{self, DbPool},
    events::{Event, EventSender},
    handlers::AppServices,
    services::{
        CatalogImportBatch, CreateQuoteInput, MaintenanceMatrix, QuoteDetails, ResolvedTemplate,
    },
};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Migrate => handle_migrate(&context).await?,
        Commands::ImportCatalog(args) => handle_import_catalog(&context, args, cli.json).await?,
        Commands::Resolve(args) => handle_resolve(&context, args, cli.json).await?,
        Commands::Matrix(args) => handle_matrix(&context, args, cli.json).await?,
        Commands::Quote(command) => handle_quote_command(&context, command, cli.json).await?,
        Commands::Settings(command) => {
            handle_settings_command(&context, command, cli.json).await?
        }
    }

    Ok(())
}

#[derive(Parser)]
#[command(
    name = "pricing-cli",
    about = "Operator CLI for maintenance templates, quotes and catalogs",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,
    /// Upsert parts and labor operations from a JSON file
    ImportCatalog(ImportCatalogArgs),
    /// Price a template against a brand catalog
    Resolve(ResolveArgs),
    /// Print the maintenance matrix for a brand
    Matrix(MatrixArgs),
    #[command(subcommand)]
    Quote(QuoteCommands),
    #[command(subcommand)]
    Settings(SettingsCommands),
}

#[derive(Args)]
struct ImportCatalogArgs {
    #[arg(help = "Path to a JSON document with brand_id, parts and labor_operations")]
    path: PathBuf,
}

#[derive(Args)]
struct ResolveArgs {
    #[arg(long, help = "Template to resolve")]
    template_id: Uuid,
    #[arg(long, help = "Brand whose catalog prices the template")]
    brand_id: Uuid,
}

#[derive(Args)]
struct MatrixArgs {
    #[arg(long)]
    brand_id: Uuid,
    #[arg(long, help = "Restrict the matrix to one vehicle model")]
    model_id: Option<Uuid>,
}

#[derive(Subcommand)]
enum QuoteCommands {
    Create(CreateQuoteArgs),
    Show(QuoteIdArgs),
    Finalize(QuoteIdArgs),
}

#[derive(Args)]
struct CreateQuoteArgs {
    #[arg(long)]
    template_id: Uuid,
    #[arg(long)]
    brand_id: Uuid,
    #[arg(long)]
    brand_name: String,
    #[arg(long)]
    model_name: Option<String>,
    #[arg(long)]
    sub_model_name: Option<String>,
    #[arg(long)]
    customer_name: Option<String>,
}

#[derive(Args)]
struct QuoteIdArgs {
    #[arg(help = "Quote id")]
    id: Uuid,
}

#[derive(Subcommand)]
enum SettingsCommands {
    Get { key: String },
    Set { key: String, value: String },
}

struct CliContext {
    config: Arc<AppConfig>,
    db: Arc<DbPool>,
    services: AppServices,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;
        let db = Arc::new(db_pool);
        let config = Arc::new(config);

        let (event_tx, mut event_rx) = mpsc::channel::<Event>(32);
        let event_sender = Arc::new(EventSender::new(event_tx));

        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                debug!(target: "pricing_cli", event = ?event, "received async event");
            }
        });

        let services = AppServices::new(db.clone(), event_sender, config.clone());

        Ok(Self {
            config,
            db,
            services,
        })
    }
}

async fn handle_migrate(context: &CliContext) -> Result<()> {
    db::run_migrations(&context.db)
        .await
        .context("failed to run migrations")?;
    println!("Migrations applied to {}", redact_url(context.config.database_url()));
    Ok(())
}

async fn handle_import_catalog(
    context: &CliContext,
    args: ImportCatalogArgs,
    json: bool,
) -> Result<()> {
    let raw = fs::read_to_string(&args.path)
        .with_context(|| format!("failed to read {}", args.path.display()))?;
    let batch: CatalogImportBatch = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid catalog document", args.path.display()))?;

    let summary = context
        .services
        .catalog_import
        .import(batch)
        .await
        .context("catalog import failed")?;

    if json {
        print_json(&summary)?;
    } else {
        println!(
            "Imported {} parts and {} labor operations in {} chunks",
            summary.parts_written, summary.labor_operations_written, summary.chunks
        );
    }
    Ok(())
}

async fn handle_resolve(context: &CliContext, args: ResolveArgs, json: bool) -> Result<()> {
    let resolved = context
        .services
        .resolver
        .resolve(args.template_id, args.brand_id)
        .await
        .context("failed to resolve template")?;

    if json {
        print_json(&resolved)?;
    } else {
        render_resolved(&resolved);
    }
    Ok(())
}

async fn handle_matrix(context: &CliContext, args: MatrixArgs, json: bool) -> Result<()> {
    let matrix = context
        .services
        .matrix
        .build(args.brand_id, args.model_id)
        .await
        .context("failed to build maintenance matrix")?;

    if json {
        print_json(&matrix)?;
    } else {
        render_matrix(&matrix);
    }
    Ok(())
}

async fn handle_quote_command(
    context: &CliContext,
    command: QuoteCommands,
    json: bool,
) -> Result<()> {
    match command {
        QuoteCommands::Create(args) => {
            let created = context
                .services
                .materializer
                .create_quote_from_template(CreateQuoteInput {
                    template_id: args.template_id,
                    brand_id: args.brand_id,
                    brand_name: args.brand_name,
                    model_name: args.model_name,
                    sub_model_name: args.sub_model_name,
                    customer_name: args.customer_name,
                })
                .await
                .context("failed to create quote")?;

            if json {
                print_json(&created)?;
            } else {
                render_quote(&QuoteDetails {
                    quote: created.quote,
                    items: created.items,
                });
                for gap in &created.gaps {
                    println!(
                        "  ! {} {} has no catalog entry (skipped)",
                        gap.item_type, gap.reference_code
                    );
                }
            }
        }
        QuoteCommands::Show(args) => {
            let details = context
                .services
                .quotes
                .get_quote(args.id)
                .await
                .context("failed to load quote")?;
            if json {
                print_json(&details)?;
            } else {
                render_quote(&details);
            }
        }
        QuoteCommands::Finalize(args) => {
            let details = context
                .services
                .quotes
                .finalize(args.id)
                .await
                .context("failed to finalize quote")?;
            if json {
                print_json(&details)?;
            } else {
                render_quote(&details);
            }
        }
    }
    Ok(())
}

async fn handle_settings_command(
    context: &CliContext,
    command: SettingsCommands,
    json: bool,
) -> Result<()> {
    match command {
        SettingsCommands::Get { key } => {
            let value = context.services.settings.get(&key).await?;
            if json {
                print_json(&serde_json::json!({ "key": key, "value": value }))?;
            } else {
                match value {
                    Some(v) => println!("{} = {}", key, v),
                    None => println!("{} is not set", key),
                }
            }
        }
        SettingsCommands::Set { key, value } => {
            context.services.settings.set(&key, &value).await?;
            if json {
                print_json(&serde_json::json!({ "key": key, "value": value }))?;
            } else {
                println!("{} = {}", key, value);
            }
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => format!("{}://***{}", &url[..scheme], &url[at..]),
        _ => url.to_string(),
    }
}

fn render_resolved(resolved: &ResolvedTemplate) {
    println!(
        "Template {} ({}) • {} lines • {} gaps",
        resolved.template.name,
        resolved.template.id,
        resolved.items.len(),
        resolved.gaps.len()
    );
    for item in &resolved.items {
        println!(
            "- {:<5} {:<16} {:<32} qty {} • {}",
            item.item_type, item.reference_code, item.name, item.quantity, item.total_price
        );
    }
    for gap in &resolved.gaps {
        println!("! {:<5} {:<16} unresolved", gap.item_type, gap.reference_code);
    }
}

fn render_matrix(matrix: &MaintenanceMatrix) {
    let header: Vec<&str> = matrix.periods.iter().map(|p| p.label.as_str()).collect();
    println!("{:<5} {:<16} {}", "TYPE", "CODE", header.join(" | "));
    for row in &matrix.rows {
        let cells: Vec<String> = row
            .cells
            .iter()
            .map(|c| {
                if c.included {
                    c.quantity.normalize().to_string()
                } else {
                    "-".to_string()
                }
            })
            .collect();
        println!("{:<5} {:<16} {}", row.item_type, row.reference_code, cells.join(" | "));
    }
    let totals: Vec<String> = matrix
        .period_totals
        .iter()
        .map(|t| t.total.normalize().to_string())
        .collect();
    println!("{:<22} {}", "TOTAL", totals.join(" | "));
    for gap in &matrix.gaps {
        println!(
            "! {} {} unresolved in {} templates",
            gap.item_type,
            gap.reference_code,
            gap.template_ids.len()
        );
    }
}

fn render_quote(details: &QuoteDetails) {
    let quote = &details.quote;
    println!(
        "Quote {} • {} • status {} • v{}",
        quote.quote_no, quote.brand_name, quote.status, quote.version
    );
    for item in &details.items {
        println!(
            "  {:<5} {:<16} {:<32} qty {} • disc {}% • {}",
            item.item_type,
            item.reference_code,
            item.name,
            item.quantity,
            item.discount_pct,
            item.total_price
        );
    }
    println!(
        "  parts {} • labor {} • discount {} • tax {} ({}%) • grand total {}",
        quote.parts_subtotal,
        quote.labor_subtotal,
        quote.discount_amount,
        quote.tax_amount,
        quote.tax_rate,
        quote.grand_total
    );
}
