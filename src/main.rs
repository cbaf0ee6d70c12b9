//! Surrogate CLI - run calls through a proxy over a built-in calculator
//!
//! Commands:
//!   surrogate call <operation> [ARGS..]  - Invoke an operation through a proxy
//!   surrogate ops                        - List the calculator's operations

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use surrogate::{
    HandlerChain, Invocation, InvokeError, MethodTable, Object, Proxy, ProxyConfig,
    SnapshotLog, TargetError, TracingObserver, Value,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "surrogate")]
#[command(about = "Run calls through a transparent proxy", long_about = None)]
struct Cli {
    /// Log proxy activity to stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Invoke an operation on the calculator through a proxy
    Call {
        /// Operation name
        operation: String,

        /// Arguments; integers are passed as s64, anything else as a string
        args: Vec<String>,

        /// Answer the call with this value instead of reaching the calculator
        #[arg(long = "override")]
        override_value: Option<String>,

        /// Multiply integer arguments by this factor before forwarding
        #[arg(long)]
        scale: Option<i64>,

        /// Proxy settings as a JSON file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the invocation snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the operations the calculator responds to
    Ops {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Call {
            operation,
            args,
            override_value,
            scale,
            config,
            json,
        } => call_command(&operation, &args, override_value.as_deref(), scale, config, json),
        Commands::Ops { json } => ops_command(json),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "surrogate=debug" } else { "surrogate=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ============================================================================
// Calculator target
// ============================================================================

struct Calculator {
    calls: AtomicU64,
}

impl Calculator {
    fn count(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }
}

fn calculator() -> Arc<Object<Calculator>> {
    let table = MethodTable::new()
        .method("double", |c: &Calculator, x: i64| -> Result<i64, TargetError> {
            c.count();
            x.checked_mul(2)
                .ok_or_else(|| TargetError::failed(format!("doubling {} overflows", x)))
        })
        .method("add", |c: &Calculator, a: i64, b: i64| -> Result<i64, TargetError> {
            c.count();
            a.checked_add(b)
                .ok_or_else(|| TargetError::failed(format!("adding {} to {} overflows", b, a)))
        })
        .method("negate", |c: &Calculator, x: i64| -> Result<i64, TargetError> {
            c.count();
            x.checked_neg()
                .ok_or_else(|| TargetError::failed(format!("negating {} overflows", x)))
        })
        .method("divide", |c: &Calculator, a: i64, b: i64| -> Result<i64, TargetError> {
            c.count();
            a.checked_div(b)
                .ok_or_else(|| TargetError::failed(format!("cannot divide {} by {}", a, b)))
        })
        .method("describe", |c: &Calculator| -> String {
            format!("calculator ({} calls)", c.calls.load(Ordering::Relaxed))
        });
    Arc::new(Object::new(
        "Calculator",
        Calculator {
            calls: AtomicU64::new(0),
        },
        table,
    ))
}

/// Integers become s64, everything else a string.
fn parse_value(raw: &str) -> Value {
    raw.parse::<i64>()
        .map(Value::S64)
        .unwrap_or_else(|_| Value::String(raw.to_string()))
}

// ============================================================================
// Commands
// ============================================================================

fn call_command(
    operation: &str,
    args: &[String],
    override_value: Option<&str>,
    scale: Option<i64>,
    config: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => ProxyConfig::from_file(&path)?,
        None => ProxyConfig::default(),
    };

    let log = SnapshotLog::new();
    let mut builder = Proxy::builder()
        .target(calculator())
        .config(config)
        .add_observer(TracingObserver)
        .add_observer(log.clone());
    let chain = handlers(override_value, scale);
    if !chain.is_empty() {
        builder = builder.interceptor(chain);
    }
    let proxy = builder.build()?;

    let arguments = args.iter().map(|raw| parse_value(raw)).collect();
    let result = proxy.invoke(operation, arguments);

    if json {
        match log.last() {
            Some(snapshot) => println!("{}", snapshot.to_json_pretty()?),
            // No record was made (unsupported operation, reentrancy)
            None => {
                if let Err(e) = &result {
                    println!("{}", serde_json::json!({ "failure": e.to_string() }));
                }
            }
        }
    }

    match result {
        Ok(value) => {
            if !json {
                println!("{}", value);
            }
            Ok(())
        }
        Err(InvokeError::Target(e)) => Err(anyhow::anyhow!("{}", e)),
        Err(InvokeError::Proxy(e)) => Err(anyhow::anyhow!("proxy error: {}", e)),
    }
}

/// Handlers for `--scale` and `--override`, in that order.
fn handlers(override_value: Option<&str>, scale: Option<i64>) -> HandlerChain {
    let mut chain = HandlerChain::new();
    if let Some(factor) = scale {
        chain = chain.then(move |inv: &mut Invocation<'_>| scale_arguments(inv, factor));
    }
    if let Some(raw) = override_value {
        let value = parse_value(raw);
        chain = chain.then(move |inv: &mut Invocation<'_>| {
            inv.set_return_value(value.clone())?;
            Ok(())
        });
    }
    chain
}

fn scale_arguments(inv: &mut Invocation<'_>, factor: i64) -> Result<(), InvokeError> {
    for arg in inv.arguments_mut()?.iter_mut() {
        if let Value::S64(x) = arg {
            let value = *x;
            *x = value.checked_mul(factor).ok_or_else(|| {
                TargetError::failed(format!("scaling {} by {} overflows", value, factor))
            })?;
        }
    }
    Ok(())
}

fn ops_command(json: bool) -> anyhow::Result<()> {
    let proxy = Proxy::new(calculator());
    let operations = proxy.operations();

    if json {
        let entries: Vec<_> = operations
            .iter()
            .map(|op| {
                serde_json::json!({
                    "signature": op.to_string(),
                    "operation": op,
                    "fingerprint": op.fingerprint().to_hex(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        println!("{}:", proxy.target().receiver_name());
        for op in &operations {
            println!("  {} [{}]", op, op.fingerprint());
        }
    }

    Ok(())
}
