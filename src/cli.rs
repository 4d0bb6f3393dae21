use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::engine::PdMode;

#[derive(Parser, Debug)]
#[command(
    name = "rx-resolve",
    version,
    about = "Prescription resolution and PD coalescing for cart lines"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Resolve(ResolveArgs),
    Coalesce(CoalesceArgs),
    Checkout(CheckoutArgs),
    Save(SaveArgs),
    SelectPd(SelectPdArgs),
    Forget(ForgetArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    #[arg(long, default_value = ".cache/rx-resolve")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

impl StoreArgs {
    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.cache_root.join("stores.sqlite"))
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }
}

#[derive(Args, Debug, Clone)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub cart: PathBuf,

    #[arg(long)]
    pub history: Option<PathBuf>,

    #[arg(long)]
    pub line: Option<String>,

    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[arg(long)]
    pub report_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct CoalesceArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long, conflicts_with = "cart", required_unless_present = "cart")]
    pub record: Option<PathBuf>,

    #[arg(long, requires = "record")]
    pub options: Option<PathBuf>,

    #[arg(long, requires = "record")]
    pub sku: Option<String>,

    #[arg(long, requires = "line")]
    pub cart: Option<PathBuf>,

    #[arg(long, requires = "cart")]
    pub line: Option<String>,

    #[arg(long, requires = "cart")]
    pub history: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct CheckoutArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub cart: PathBuf,

    #[arg(long)]
    pub history: Option<PathBuf>,

    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct SaveArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub record: PathBuf,

    #[arg(long)]
    pub line: String,

    #[arg(long)]
    pub sku: String,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum PdModeArg {
    Single,
    Dual,
}

impl From<PdModeArg> for PdMode {
    fn from(value: PdModeArg) -> Self {
        match value {
            PdModeArg::Single => Self::Single,
            PdModeArg::Dual => Self::Dual,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct SelectPdArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub sku: String,

    #[arg(long)]
    pub right: Option<String>,

    #[arg(long)]
    pub left: Option<String>,

    #[arg(long)]
    pub single: Option<String>,

    #[arg(long, value_enum)]
    pub mode: Option<PdModeArg>,
}

#[derive(Args, Debug, Clone)]
pub struct ForgetArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub line: String,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub store: StoreArgs,
}
