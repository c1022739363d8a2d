//! Cartwheel CLI - Drive a checkout session from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Show the cart, shipping address and price summary
//! cartwheel cart show
//!
//! # Browse the location hierarchy
//! cartwheel locations provinces
//! cartwheel locations districts 79
//!
//! # Change a line's quantity and apply a discount
//! cartwheel cart quantity 12 3
//! cartwheel discount apply SALE10
//!
//! # Place a cash-on-delivery order as a guest
//! cartwheel --guest checkout submit -p cod -e lan@example.vn -n Lan --phone 0901234567 \
//!     --province 79 --district 1442 --ward 20308 --detail "12 Nguyen Hue"
//! ```
//!
//! # Commands
//!
//! - `locations` - List provinces, districts or wards
//! - `addresses` - Manage saved addresses
//! - `cart` - Show the checkout, change quantities or drop lines
//! - `discount apply` - Price the checkout with a discount code
//! - `checkout submit` - Place the order
//!
//! Configuration is read from the environment (see `CheckoutConfig::from_env`).

#![cfg_attr(not(test), forbid(unsafe_code))]

use cartwheel_checkout::config::CheckoutConfig;
use cartwheel_core::{AddressId, CartLineId, DistrictId, OwnerId, PaymentMethod, ProvinceId};
use clap::{Args, Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "cartwheel")]
#[command(author, version, about = "Cartwheel checkout CLI")]
struct Cli {
    /// Check out as a guest even if `CHECKOUT_OWNER_ID` is set
    #[arg(long, global = true, conflicts_with = "owner")]
    guest: bool,

    /// Check out as this account instead of `CHECKOUT_OWNER_ID`
    #[arg(long, global = true)]
    owner: Option<OwnerId>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Browse the location hierarchy
    Locations {
        #[command(subcommand)]
        tier: LocationsCommand,
    },
    /// Manage saved addresses
    Addresses {
        #[command(subcommand)]
        action: AddressAction,
    },
    /// Change cart lines
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Discount codes
    Discount {
        #[command(subcommand)]
        action: DiscountAction,
    },
    /// Place orders
    Checkout {
        #[command(subcommand)]
        action: CheckoutAction,
    },
}

#[derive(Subcommand)]
enum LocationsCommand {
    /// List provinces
    Provinces,
    /// List districts in a province
    Districts { province: ProvinceId },
    /// List wards in a district
    Wards { district: DistrictId },
}

#[derive(Subcommand)]
enum AddressAction {
    /// List saved addresses
    List,
    /// Save a new address
    Add {
        #[command(flatten)]
        address: AddressArgs,

        /// Make it the default address
        #[arg(long)]
        default: bool,
    },
    /// Delete a saved address
    Delete { id: AddressId },
    /// Make a saved address the default
    SetDefault { id: AddressId },
}

#[derive(Subcommand)]
enum CartAction {
    /// Print the lines, shipping address and price summary
    Show,
    /// Set a line's quantity (clamped to stock, at most 99)
    Quantity {
        line: CartLineId,
        /// Quantity as typed; non-numeric input counts as 1
        quantity: String,
    },
    /// Drop a line from this checkout
    Unselect { line: CartLineId },
}

#[derive(Subcommand)]
enum DiscountAction {
    /// Price the checkout with a discount code
    Apply {
        /// Code to apply (case-insensitive)
        code: String,
    },
}

#[derive(Subcommand)]
enum CheckoutAction {
    /// Place the order
    Submit(SubmitArgs),
}

/// Recipient and location fields.
#[derive(Args, Clone, Default)]
pub struct AddressArgs {
    /// Recipient name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Recipient phone number
    #[arg(long)]
    pub phone: Option<String>,

    #[arg(long)]
    pub province: Option<ProvinceId>,

    #[arg(long)]
    pub district: Option<DistrictId>,

    /// Ward code
    #[arg(long)]
    pub ward: Option<String>,

    /// Street address
    #[arg(long)]
    pub detail: Option<String>,
}

/// Fields for placing an order.
#[derive(Args)]
pub struct SubmitArgs {
    /// Payment method (`cod`, `vnpay`, `momo`)
    #[arg(short, long)]
    pub payment: PaymentMethod,

    /// Email for the order confirmation
    #[arg(short, long)]
    pub email: String,

    /// Ship to this saved address
    #[arg(long, conflicts_with_all = ["province", "district", "ward", "detail"])]
    pub address: Option<AddressId>,

    #[command(flatten)]
    pub shipping: AddressArgs,

    /// Note for the seller
    #[arg(long)]
    pub note: Option<String>,

    /// Discount code to apply before submitting
    #[arg(long)]
    pub discount: Option<String>,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &CheckoutConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cartwheel_checkout=info,cartwheel_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match CheckoutConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing();
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(2);
        }
    };

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry(&config);
    init_tracing();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli, config).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, mut config: CheckoutConfig) -> Result<(), Box<dyn std::error::Error>> {
    if cli.guest {
        config.owner_id = None;
    } else if let Some(owner) = cli.owner {
        config.owner_id = Some(owner);
    }
    let output = commands::Output::new(cli.json);

    match cli.command {
        Commands::Locations { tier } => match tier {
            LocationsCommand::Provinces => {
                commands::locations::provinces(&config, output).await?;
            }
            LocationsCommand::Districts { province } => {
                commands::locations::districts(&config, province, output).await?;
            }
            LocationsCommand::Wards { district } => {
                commands::locations::wards(&config, district, output).await?;
            }
        },
        Commands::Addresses { action } => match action {
            AddressAction::List => commands::addresses::list(&config, output).await?,
            AddressAction::Add { address, default } => {
                commands::addresses::add(&config, address, default, output).await?;
            }
            AddressAction::Delete { id } => {
                commands::addresses::delete(&config, id, output).await?;
            }
            AddressAction::SetDefault { id } => {
                commands::addresses::set_default(&config, id, output).await?;
            }
        },
        Commands::Cart { action } => match action {
            CartAction::Show => commands::session::summary(&config, output).await?,
            CartAction::Quantity { line, quantity } => {
                commands::session::quantity(&config, line, &quantity, output).await?;
            }
            CartAction::Unselect { line } => {
                commands::session::unselect(&config, line, output).await?;
            }
        },
        Commands::Discount {
            action: DiscountAction::Apply { code },
        } => commands::session::discount(&config, &code, output).await?,
        Commands::Checkout {
            action: CheckoutAction::Submit(args),
        } => commands::session::submit(&config, args, output).await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_submit_parses_payment_method() {
        let cli = Cli::try_parse_from([
            "cartwheel", "checkout", "submit", "-p", "vnpay", "-e", "lan@example.vn", "--address", "3",
        ])
        .unwrap_or_else(|e| panic!("{e}"));
        let Commands::Checkout {
            action: CheckoutAction::Submit(args),
        } = cli.command
        else {
            panic!("expected submit");
        };
        assert_eq!(args.payment, PaymentMethod::Vnpay);
        assert_eq!(args.address, Some(AddressId::new(3)));
    }

    #[test]
    fn test_saved_address_conflicts_with_location_flags() {
        let result = Cli::try_parse_from([
            "cartwheel", "checkout", "submit", "-p", "cod", "-e", "a@b.vn", "--address", "3", "--ward",
            "20308",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_guest_conflicts_with_owner() {
        let result = Cli::try_parse_from(["cartwheel", "--guest", "--owner", "8", "cart", "show"]);
        assert!(result.is_err());
    }
}
