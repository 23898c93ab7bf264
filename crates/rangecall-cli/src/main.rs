use std::path::{Path, PathBuf};

use clap::Parser;

use rangecall::{ArgValue, CellOrder, Engine, Flatten, InputKind, PriceFlags, RangeData, Registry};

#[derive(Parser)]
#[command(
    name = "rangecall",
    version,
    about = "Run an analysis-library function over ragged CSV columns"
)]
struct Args {
    /// Function name (see --list)
    func: Option<String>,

    /// Input CSV file, one value per row; blank or non-numeric rows are
    /// treated as missing. Repeatable, in declared parameter order.
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    inputs: Vec<PathBuf>,

    /// Optional parameter as NAME=VALUE (value may be a number or an
    /// enumerated label). Repeatable.
    #[arg(short = 'o', long = "opt", value_name = "NAME=VALUE")]
    opts: Vec<String>,

    /// Flatten multi-column ranges column-first instead of row-first
    #[arg(long)]
    column_major: bool,

    /// Treat series as running bottom-up in the sheet
    #[arg(long)]
    bottom_up: bool,

    /// List available functions and exit
    #[arg(long)]
    list: bool,
}

fn main() {
    let args = Args::parse();
    let registry = Registry::with_builtins();

    if args.list {
        list_functions(&registry);
        return;
    }

    let func = match args.func {
        Some(ref f) => f.as_str(),
        None => {
            eprintln!("Error: no function given (try --list)");
            std::process::exit(1);
        }
    };

    let mut engine = Engine::new(registry);
    if args.column_major {
        engine = engine.with_flatten(Flatten::ColumnMajor);
    }
    if args.bottom_up {
        engine = engine.with_cell_order(CellOrder::BottomUp);
    }

    let call_args = match build_args(&engine, func, &args.inputs, &args.opts) {
        Ok(a) => a,
        Err(msg) => {
            eprintln!("Error: {msg}");
            std::process::exit(1);
        }
    };

    match engine.call(func, &call_args) {
        Ok(frame) => print_frame(&engine, func, &frame),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn list_functions(registry: &Registry) {
    println!("rangecall {}", rangecall::version());
    let mut group = "";
    for info in registry.iter() {
        if info.group != group {
            group = info.group;
            println!("\n{group}");
        }
        println!("  {} - {}", info.name, info.hint);
        for input in &info.inputs {
            match input.kind {
                InputKind::RealSeries => println!("      input {}: series", input.name),
                InputKind::IntegerSeries => {
                    println!("      input {}: integer series", input.name)
                }
                InputKind::Price(flags) => {
                    println!("      input {}: columns {}", input.name, price_fields(flags))
                }
            }
        }
        for opt in &info.opt_inputs {
            println!("      opt {}: {} ({})", opt.name, opt.hint, opt.kind.describe());
        }
    }
}

fn price_fields(flags: PriceFlags) -> String {
    let mut fields = Vec::new();
    for (flag, name) in [
        (PriceFlags::OPEN, "open"),
        (PriceFlags::HIGH, "high"),
        (PriceFlags::LOW, "low"),
        (PriceFlags::CLOSE, "close"),
        (PriceFlags::VOLUME, "volume"),
        (PriceFlags::OPEN_INTEREST, "open interest"),
    ] {
        if flags.contains(flag) {
            fields.push(name);
        }
    }
    fields.join(", ")
}

fn build_args(
    engine: &Engine,
    func: &str,
    inputs: &[PathBuf],
    opts: &[String],
) -> Result<Vec<ArgValue>, String> {
    let handle = engine
        .registry()
        .handle(func)
        .map_err(|e| e.to_string())?;
    let info = engine.registry().info(handle);
    let n_cols = info.caller_input_columns();

    if inputs.len() != n_cols {
        return Err(format!(
            "{} expects {} input column(s), got {}",
            info.name,
            n_cols,
            inputs.len()
        ));
    }

    let mut call_args = Vec::with_capacity(info.caller_arity());
    for path in inputs {
        let cells = read_column(path)?;
        call_args.push(ArgValue::Range(RangeData::from_column(cells)));
    }
    call_args.extend(std::iter::repeat_with(|| ArgValue::Missing).take(info.opt_inputs.len()));

    for spec in opts {
        let (name, value) = spec
            .split_once('=')
            .ok_or_else(|| format!("--opt expects NAME=VALUE, got: {spec}"))?;
        let idx = info
            .opt_inputs
            .iter()
            .position(|o| o.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| format!("{} has no option named {name}", info.name))?;
        call_args[n_cols + idx] = ArgValue::Text(value.to_string());
    }
    Ok(call_args)
}

fn read_column(path: &Path) -> Result<Vec<f64>, String> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let cells: Vec<f64> = contents
        .lines()
        .map(|line| line.trim().parse::<f64>().unwrap_or(f64::NAN))
        .collect();
    if cells.is_empty() {
        return Err(format!("{} holds no rows", path.display()));
    }
    Ok(cells)
}

fn print_frame(engine: &Engine, func: &str, frame: &rangecall::OutputFrame) {
    // Header from the output descriptors; the lookup cannot fail after a
    // successful call.
    if let Ok(handle) = engine.registry().handle(func) {
        let names: Vec<&str> = engine
            .registry()
            .info(handle)
            .outputs
            .iter()
            .map(|o| o.name)
            .collect();
        println!("{}", names.join(","));
    }
    for r in 0..frame.rows() {
        let row: Vec<String> = (0..frame.cols())
            .map(|c| {
                let v = frame.get(r, c);
                if v.is_nan() {
                    String::new()
                } else {
                    format!("{v}")
                }
            })
            .collect();
        println!("{}", row.join(","));
    }
}
