//! # Fleetprint CLI
//!
//! Command-line front end for the printer fleet and receipt templates.
//!
//! ## Usage
//!
//! ```bash
//! # Find nearby printers
//! fleetprint printers scan
//!
//! # Add one and make it the default
//! fleetprint printers add --address 00:11:62:AA:BB:CC --name "Front counter" --default
//!
//! # Print a test page
//! fleetprint printers test <ID>
//!
//! # Hide prices on the kitchen ticket
//! fleetprint templates toggle kitchen item_prices off
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{Level as TraceLevel, warn};
use tracing_subscriber::FmtSubscriber;

use fleetprint::{
    FleetError, FleetResult, PrinterFleetManager, TemplateDependencyEngine, TemplateLibrary,
    discovery::{BluetoothctlDiscovery, DiscoveredDevice},
    driver::{RfcommDriver, rfcomm::DEFAULT_CHANNEL},
    fleet::{DraftEdit, SetupEvent, SetupIntent},
    model::{Cluster, Field, PaperWidth, PrinterId, TemplateConfig, TemplateType},
    store::{JsonFileStore, StoreError},
};

/// Fleetprint - Receipt printer fleet utility
#[derive(Parser, Debug)]
#[command(name = "fleetprint")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON file holding printers and templates
    #[arg(long, global = true, value_name = "FILE", default_value = "fleetprint.json")]
    store: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// RFCOMM channel used when binding a printer's device node
    #[arg(long, global = true, default_value_t = DEFAULT_CHANNEL)]
    rfcomm_channel: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage configured printers
    #[command(subcommand)]
    Printers(PrinterCommand),

    /// Manage receipt templates
    #[command(subcommand)]
    Templates(TemplateCommand),
}

#[derive(Subcommand, Debug)]
enum PrinterCommand {
    /// List configured printers
    List,

    /// Scan for nearby Bluetooth devices
    Scan {
        /// Seconds to listen
        #[arg(long, default_value = "8")]
        timeout: u64,
    },

    /// Add a printer by address
    Add {
        /// Bluetooth address (XX:XX:XX:XX:XX:XX)
        #[arg(long)]
        address: String,

        /// Display name (defaults to the address)
        #[arg(long)]
        name: Option<String>,

        /// Paper width: 58 or 80 (anything else falls back to 58)
        #[arg(long, default_value = "58")]
        paper: String,

        /// Make this the default printer
        #[arg(long)]
        default: bool,

        /// Print new orders without confirmation
        #[arg(long)]
        auto_print: bool,

        /// Cut the paper after each receipt
        #[arg(long)]
        auto_cut: bool,

        /// Copies per receipt (1-9)
        #[arg(long, default_value = "1")]
        copies: u8,
    },

    /// Make a printer the default
    SetDefault { id: PrinterId },

    /// Remove a printer
    Remove { id: PrinterId },

    /// Connect and print a test page
    Test { id: PrinterId },
}

#[derive(Subcommand, Debug)]
enum TemplateCommand {
    /// List templates
    List,

    /// Show which fields a template prints
    Show { id: String },

    /// Show or hide one field
    Toggle {
        id: String,
        field: Field,
        state: Switch,
    },

    /// Create a blank custom template
    Create {
        name: String,

        /// full_details, delivery or kitchen
        #[arg(long = "type", default_value = "full_details")]
        template_type: TemplateType,
    },

    /// Copy a template into a new custom one
    Copy { id: String, name: String },

    /// Restore a built-in template's defaults
    Reset { id: String },

    /// Delete a custom template
    Delete { id: String },

    /// Delete all custom templates and reset the built-ins
    ResetAll,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Switch {
    On,
    Off,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> FleetResult<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let store = Arc::new(JsonFileStore::new(&cli.store));

    match cli.command {
        Commands::Printers(command) => {
            let timeout = match &command {
                PrinterCommand::Scan { timeout } => Duration::from_secs(*timeout),
                _ => fleetprint::discovery::bluetoothctl::DEFAULT_SCAN_TIMEOUT,
            };
            let manager = PrinterFleetManager::new(
                store,
                Arc::new(BluetoothctlDiscovery::new().with_timeout(timeout)),
                Arc::new(RfcommDriver::new(cli.rfcomm_channel)),
            );
            manager.load().await?;
            run_printers(&manager, command).await
        }
        Commands::Templates(command) => {
            let library = TemplateLibrary::new(store);
            library.ensure_defaults().await?;
            run_templates(&library, command).await
        }
    }
}

fn init_logging(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Warning: logging disabled: {}", e);
    }
}

// ============================================================================
// PRINTERS
// ============================================================================

async fn run_printers(manager: &PrinterFleetManager, command: PrinterCommand) -> FleetResult<()> {
    match command {
        PrinterCommand::List => {
            let printers = manager.printers().await;
            if printers.is_empty() {
                println!("No printers configured. Add one with `fleetprint printers add`.");
            }
            for p in printers {
                let mut flags = Vec::new();
                if p.is_default {
                    flags.push("default");
                }
                if p.is_auto_print {
                    flags.push("auto-print");
                }
                if p.auto_cut {
                    flags.push("auto-cut");
                }
                println!(
                    "{}  {:<20} {}  {:<5} {:<7} x{}  {}",
                    p.id,
                    p.display_name(),
                    p.address,
                    p.paper_width,
                    p.brand,
                    p.copies,
                    flags.join(",")
                );
            }
        }

        PrinterCommand::Scan { .. } => {
            let devices = manager.scan().await?;
            if devices.is_empty() {
                println!("No devices found.");
            }
            for device in devices {
                print_device(&device);
            }
        }

        PrinterCommand::Add {
            address,
            name,
            paper,
            default,
            auto_print,
            auto_cut,
            copies,
        } => {
            let width = paper_width_arg(&paper);
            let device = DiscoveredDevice::new(name.as_deref(), address.trim());
            let mut flow = manager
                .begin_setup(SetupIntent::NewFromDevice(device))
                .await?;

            let mut edits = vec![
                DraftEdit::PaperWidth(width),
                DraftEdit::AutoPrint(auto_print),
                DraftEdit::AutoCut(auto_cut),
                DraftEdit::Copies(copies),
            ];
            if name.is_none() {
                edits.push(DraftEdit::Name(address.trim().to_string()));
            }
            if default {
                edits.push(DraftEdit::Default(true));
            }
            for edit in edits {
                manager.dispatch(&mut flow, SetupEvent::Edit(edit)).await?;
            }
            manager.dispatch(&mut flow, SetupEvent::Save).await?;

            if let Some(saved) = flow.draft() {
                println!("Added {} ({})", saved.display_name(), saved.id);
                if saved.is_default {
                    println!("It is the default printer.");
                }
            }
        }

        PrinterCommand::SetDefault { id } => {
            manager.set_default(id).await?;
            println!("Default printer: {}", manager.get(id).await?.display_name());
        }

        PrinterCommand::Remove { id } => {
            let name = manager.get(id).await?.display_name().to_string();
            manager.delete(id).await?;
            println!("Removed {}", name);
        }

        PrinterCommand::Test { id } => {
            let brand = manager.connect(id).await?;
            println!("Connected ({})", brand);
            let result = manager.test_print(id).await;
            manager.disconnect(id).await?;
            result?;
            println!("Test page sent.");
        }
    }
    Ok(())
}

/// Lenient `--paper` parsing: unsupported widths fall back to the default.
fn paper_width_arg(value: &str) -> PaperWidth {
    PaperWidth::parse(value).unwrap_or_else(|| {
        let fallback = PaperWidth::default();
        warn!(value, fallback = %fallback, "Unsupported paper width; using default");
        fallback
    })
}

fn print_device(device: &DiscoveredDevice) {
    let mut notes = Vec::new();
    if device.bonded {
        notes.push("paired");
    }
    if device.looks_like_printer() {
        notes.push("printer?");
    }
    println!(
        "{}  {:<28} {}",
        device.address,
        device.display_name(),
        notes.join(", ")
    );
}

// ============================================================================
// TEMPLATES
// ============================================================================

async fn run_templates(library: &TemplateLibrary, command: TemplateCommand) -> FleetResult<()> {
    match command {
        TemplateCommand::List => {
            for t in library.list().await? {
                let kind = if t.is_builtin() { "built-in" } else { "custom" };
                println!(
                    "{:<40} {:<22} {:<12} {:<8} {} sections",
                    t.template_id,
                    t.template_name,
                    t.template_type,
                    kind,
                    t.enabled_section_count()
                );
            }
        }

        TemplateCommand::Show { id } => print_template(&library.load(&id).await?),

        TemplateCommand::Toggle { id, field, state } => {
            let mut engine = TemplateDependencyEngine::new(library.load(&id).await?);
            engine.toggle(field, matches!(state, Switch::On))?;
            let saved = library.save(engine.into_draft()).await?;
            print_template(&saved);
        }

        TemplateCommand::Create {
            name,
            template_type,
        } => {
            let created = library.create_custom(&name, template_type).await?;
            println!("Created {} ({})", created.template_name, created.template_id);
        }

        TemplateCommand::Copy { id, name } => {
            let copy = library.copy(&id, &name).await?;
            println!("Copied to {} ({})", copy.template_name, copy.template_id);
        }

        TemplateCommand::Reset { id } => {
            let reset = library.reset_to_default(&id).await?;
            println!("Reset {}", reset.template_name);
        }

        TemplateCommand::Delete { id } => {
            library.delete(&id).await?;
            println!("Deleted {}", id);
        }

        TemplateCommand::ResetAll => {
            let summary = library.reset_all().await?;
            println!(
                "Reset {} built-in templates, deleted {} custom templates",
                summary.reset.len(),
                summary.deleted.len()
            );
            for (id, message) in &summary.failures {
                println!("  failed: {}: {}", id, message);
            }
            if !summary.is_complete() {
                return Err(FleetError::Persistence(StoreError::Unavailable(format!(
                    "{} reset step(s) failed",
                    summary.failures.len()
                ))));
            }
        }
    }
    Ok(())
}

fn print_template(t: &TemplateConfig) {
    println!("{} ({}, {})", t.template_name, t.template_id, t.template_type);
    for cluster in Cluster::ALL {
        let parent = cluster.parent();
        println!("  [{}] {}", mark(t.get(parent)), parent);
        for child in cluster.children() {
            println!("      [{}] {}", mark(t.get(*child)), child);
        }
    }
    if t.show_footer && !t.footer_text.is_empty() {
        println!("  footer: {}", t.footer_text);
    }
}

fn mark(on: bool) -> char {
    if on { 'x' } else { ' ' }
}
