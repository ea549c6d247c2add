//! configuration for the crank binary.
//!
//! every value comes from an environment variable; a few can be overridden
//! with `--flag value` on the command line.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crank_content::GatewayConfig;
use crank_ledger::SUB_ACCOUNT_CAPACITY;
use solana_sdk::pubkey::Pubkey;

use crate::scheduler::{parse_utc_offset, Schedule};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid {name}={value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// router and vault programs.
#[derive(Debug, Clone)]
pub struct ProgramConfig {
    pub router_program: Pubkey,
    pub vault_program: Pubkey,
    /// interface definitions; recorded for operators, not read.
    pub router_idl_path: Option<PathBuf>,
    pub vault_idl_path: Option<PathBuf>,
    /// recipients per vault sub-account.
    pub capacity: u8,
}

impl ProgramConfig {
    pub fn new(router_program: Pubkey, vault_program: Pubkey) -> Self {
        Self {
            router_program,
            vault_program,
            router_idl_path: None,
            vault_idl_path: None,
            capacity: SUB_ACCOUNT_CAPACITY,
        }
    }
}

/// key files decoded at startup.
#[derive(Debug, Clone)]
pub struct KeyPaths {
    /// fee payer, mint authority and router authority.
    pub wallet: PathBuf,
    /// router account keypair; only its public key is used.
    pub router: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AssetConfig {
    pub images_folder: PathBuf,
    pub items_available: u64,
    /// edition cap; `None` leaves it open.
    pub max_supply: Option<u64>,
}

/// crank application configuration.
#[derive(Debug, Clone)]
pub struct CrankConfig {
    pub ledger: crank_ledger::Config,
    pub program: ProgramConfig,
    pub keys: KeyPaths,
    pub assets: AssetConfig,
    pub schedule: Schedule,
    pub content: GatewayConfig,
    /// json record file; in-memory records when unset.
    pub records_path: Option<PathBuf>,
    pub http_addr: SocketAddr,
}

impl CrankConfig {
    /// config with the given endpoints and defaults for everything else.
    ///
    /// content goes to a local gateway until `with_content` says otherwise.
    pub fn new(ledger: crank_ledger::Config, program: ProgramConfig, keys: KeyPaths) -> Self {
        Self {
            ledger,
            program,
            keys,
            assets: AssetConfig {
                images_folder: PathBuf::from("images"),
                items_available: 0,
                max_supply: None,
            },
            schedule: Schedule::hourly(),
            content: GatewayConfig::localnet(""),
            records_path: None,
            http_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }

    /// create config for devnet.
    pub fn devnet(program: ProgramConfig, keys: KeyPaths) -> Self {
        Self::new(crank_ledger::Config::devnet(), program, keys)
    }

    /// create config for a local validator.
    pub fn localnet(program: ProgramConfig, keys: KeyPaths) -> Self {
        Self::new(crank_ledger::Config::localnet(), program, keys)
    }

    pub fn with_images_folder(mut self, path: impl Into<PathBuf>) -> Self {
        self.assets.images_folder = path.into();
        self
    }

    pub fn with_items_available(mut self, items: u64) -> Self {
        self.assets.items_available = items;
        self
    }

    pub fn with_max_supply(mut self, max_supply: Option<u64>) -> Self {
        self.assets.max_supply = max_supply;
        self
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_content(mut self, content: GatewayConfig) -> Self {
        self.content = content;
        self
    }

    pub fn with_records_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.records_path = Some(path.into());
        self
    }

    /// set http bind address.
    pub fn with_http_addr(mut self, addr: SocketAddr) -> Self {
        self.http_addr = addr;
        self
    }

    /// read the process environment and command line.
    pub fn from_env() -> Result<Self, ConfigError> {
        let args: Vec<String> = env::args().collect();
        Self::from_sources(&args, |name| env::var(name).ok())
    }

    /// build from `--flag value` arguments and a variable lookup.
    pub fn from_sources(
        args: &[String],
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |flag: Option<&str>, name: &str| {
            flag.and_then(|f| arg_value(args, f))
                .or_else(|| var(name))
                .filter(|v| !v.trim().is_empty())
        };

        let rpc_url = get(Some("--rpc"), "RPC_URL").unwrap_or_else(|| "http://localhost:8899".into());
        let ws_url = get(Some("--ws"), "WS_URL").unwrap_or_else(|| "ws://localhost:8900".into());
        let mut ledger = crank_ledger::Config::custom(rpc_url, ws_url);
        if let Some(ms) = get(None, "CONFIRM_TIMEOUT_MS") {
            let ms: u64 = parse("CONFIRM_TIMEOUT_MS", &ms)?;
            ledger = ledger.with_confirm_timeout(Duration::from_millis(ms));
        }

        let mut program = ProgramConfig::new(
            parse_key("ROUTER_PROGRAM_ID", get(None, "ROUTER_PROGRAM_ID"))?,
            parse_key("VAULT_PROGRAM_ID", get(None, "VAULT_PROGRAM_ID"))?,
        );
        program.router_idl_path = get(None, "ROUTER_IDL_PATH").map(PathBuf::from);
        program.vault_idl_path = get(None, "VAULT_IDL_PATH").map(PathBuf::from);
        if let Some(cap) = get(None, "MAX_SUB_ACCOUNT_CAPACITY") {
            program.capacity = parse("MAX_SUB_ACCOUNT_CAPACITY", &cap)?;
            if program.capacity == 0 {
                return Err(invalid("MAX_SUB_ACCOUNT_CAPACITY", &cap, "must be at least 1"));
            }
        }

        let keys = KeyPaths {
            wallet: get(Some("--wallet"), "PROGRAM_WALLET")
                .map(PathBuf::from)
                .ok_or(ConfigError::Missing("PROGRAM_WALLET"))?,
            router: get(Some("--router-secret"), "ROUTER_SECRET")
                .map(PathBuf::from)
                .ok_or(ConfigError::Missing("ROUTER_SECRET"))?,
        };

        let items = get(None, "ITEMS_AVAILABLE").ok_or(ConfigError::Missing("ITEMS_AVAILABLE"))?;
        let max_supply = get(None, "MAX_SUPPLY")
            .map(|v| parse("MAX_SUPPLY", &v))
            .transpose()?;

        let interval_secs: u64 = match get(Some("--interval"), "CRANK_INTERVAL_SECS") {
            Some(v) => parse("CRANK_INTERVAL_SECS", &v)?,
            None => 3600,
        };
        let timezone = get(Some("--timezone"), "CRANK_TIMEZONE").unwrap_or_else(|| "UTC".into());
        let offset = parse_utc_offset(&timezone)
            .ok_or_else(|| invalid("CRANK_TIMEZONE", &timezone, "expected UTC, +HH:MM or -HH:MM"))?;
        let schedule = Schedule::new(Duration::from_secs(interval_secs), offset)
            .ok_or_else(|| invalid("CRANK_INTERVAL_SECS", &interval_secs.to_string(), "must be at least 1"))?;

        let gateway = get(None, "ARWEAVE_GATEWAY").unwrap_or_else(|| "https://arweave.net".into());
        let content = GatewayConfig::custom(
            gateway,
            get(None, "ARWEAVE_UPLOAD_URL").ok_or(ConfigError::Missing("ARWEAVE_UPLOAD_URL"))?,
            get(None, "ARWEAVE_WALLET").ok_or(ConfigError::Missing("ARWEAVE_WALLET"))?,
        );

        let http = get(Some("--http"), "HTTP_ADDR").unwrap_or_else(|| "127.0.0.1:8080".into());
        let http_addr: SocketAddr = parse("HTTP_ADDR", &http)?;

        let mut config = CrankConfig::new(ledger, program, keys)
            .with_images_folder(get(Some("--images"), "IMAGES_FOLDER").unwrap_or_else(|| "images".into()))
            .with_items_available(parse("ITEMS_AVAILABLE", &items)?)
            .with_max_supply(max_supply)
            .with_schedule(schedule)
            .with_content(content)
            .with_http_addr(http_addr);
        if let Some(path) = get(Some("--records"), "RECORDS_PATH") {
            config = config.with_records_path(path);
        }
        Ok(config)
    }
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1).cloned())
}

fn invalid(name: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| invalid(name, value, e.to_string()))
}

fn parse_key(name: &'static str, value: Option<String>) -> Result<Pubkey, ConfigError> {
    let value = value.ok_or(ConfigError::Missing(name))?;
    parse(name, &value)
}
