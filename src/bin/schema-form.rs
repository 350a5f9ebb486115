//! Schema Form CLI
//!
//! Command-line interface for resolving schemas and inspecting form state.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use schema_form::{
    compute_defaults, load_schema, load_schema_auto, resolve, Form, FormOptions, FormProps,
    MemoCache, Registry, ResolveError, ResolverRegistry, SubmitEvent,
};

#[derive(Parser)]
#[command(name = "schema-form")]
#[command(about = "Resolve JSON Schemas and inspect derived form state")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve $ref and dependencies against form data
    Resolve(CommonArgs),

    /// Compute default form data
    Defaults(CommonArgs),

    /// Build the field id tree
    Ids(CommonArgs),

    /// Validate form data (after defaults) against the schema
    Validate {
        #[command(flatten)]
        common: CommonArgs,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },

    /// Render the form as a field outline
    Render(CommonArgs),
}

#[derive(Args)]
struct CommonArgs {
    /// Schema source: file path or URL (http:// or https://)
    schema: String,

    /// Form data file
    #[arg(long)]
    data: Option<PathBuf>,

    /// uiSchema file
    #[arg(long)]
    ui_schema: Option<PathBuf>,

    /// Form options file (JSON, camelCase keys)
    #[arg(long)]
    options: Option<PathBuf>,

    /// Root token of field ids (overrides the options file)
    #[arg(long)]
    id_prefix: Option<String>,

    /// Output file (stdout if not specified)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

/// Documents loaded for one command.
struct Inputs {
    schema: Value,
    definitions: Value,
    data: Option<Value>,
    ui_schema: Value,
    options: FormOptions,
}

impl Inputs {
    fn props(&self) -> FormProps {
        let mut props = FormProps::new(self.schema.clone())
            .ui_schema(self.ui_schema.clone())
            .options(self.options.clone());
        props.form_data = self.data.clone();
        props
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Resolve(args) => run_resolve(&args),
        Commands::Defaults(args) => run_defaults(&args),
        Commands::Ids(args) => run_ids(&args),
        Commands::Validate { common, json } => run_validate(&common, json),
        Commands::Render(args) => run_render(&args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn run_resolve(args: &CommonArgs) -> Result<(), u8> {
    let inputs = load_inputs(args)?;
    let resolved = resolve(&inputs.schema, &inputs.definitions, inputs.data.as_ref())
        .map_err(fail)?;
    write_output(args, &resolved)
}

fn run_defaults(args: &CommonArgs) -> Result<(), u8> {
    let inputs = load_inputs(args)?;
    let defaults = compute_defaults(&inputs.schema, inputs.data.as_ref(), &inputs.definitions)
        .map_err(fail)?;
    write_output(args, &defaults.unwrap_or(Value::Null))
}

fn run_ids(args: &CommonArgs) -> Result<(), u8> {
    let inputs = load_inputs(args)?;
    let form = Form::new(inputs.props()).map_err(fail)?;
    write_output(args, &form.state().id_schema)
}

fn run_validate(args: &CommonArgs, json_output: bool) -> Result<(), u8> {
    let inputs = load_inputs(args).map_err(|code| {
        if json_output {
            println!(r#"{{"valid":false}}"#);
        }
        code
    })?;

    let outcome = Form::new(inputs.props()).and_then(|mut form| {
        form.submit(&mut SubmitEvent::new())?;
        Ok(form)
    });
    let form = match outcome {
        Ok(form) => form,
        Err(e) => {
            report_error(json_output, &e.to_string());
            return Err(e.exit_code() as u8);
        }
    };

    let state = form.state();
    if state.errors.is_empty() {
        if json_output {
            println!(r#"{{"valid":true}}"#);
        } else {
            println!("Valid");
        }
        return Ok(());
    }

    if json_output {
        let output = serde_json::json!({
            "valid": false,
            "errors": state.errors,
            "errorSchema": state.error_schema
        });
        println!("{}", output);
    } else {
        eprintln!("Validation failed:");
        for error in &state.errors {
            eprintln!("  {}", error);
        }
    }
    Err(1)
}

fn run_render(args: &CommonArgs) -> Result<(), u8> {
    let inputs = load_inputs(args)?;
    let form = Form::new(inputs.props()).map_err(fail)?;
    let rendered = form
        .render(
            &Registry::new(),
            &ResolverRegistry::new(),
            &MemoCache::new(),
            &Value::Null,
        )
        .map_err(fail)?;
    write_output(args, &rendered)
}

fn load_inputs(args: &CommonArgs) -> Result<Inputs, u8> {
    let schema = load_schema_auto(&args.schema).map_err(|e| {
        eprintln!("Error loading schema: {}", e);
        e.exit_code() as u8
    })?;
    let data = args.data.as_deref().map(load_document).transpose()?;
    let ui_schema = match args.ui_schema.as_deref() {
        Some(path) => load_document(path)?,
        None => Value::Object(Default::default()),
    };

    let mut options = match args.options.as_deref() {
        Some(path) => serde_json::from_value(load_document(path)?).map_err(|e| {
            eprintln!("Error: invalid options in {}: {}", path.display(), e);
            2u8
        })?,
        None => FormOptions::default(),
    };
    if let Some(prefix) = &args.id_prefix {
        options.id_prefix = prefix.clone();
    }

    let definitions = schema
        .get("definitions")
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));

    Ok(Inputs {
        schema,
        definitions,
        data,
        ui_schema,
        options,
    })
}

fn load_document(path: &Path) -> Result<Value, u8> {
    load_schema(path).map_err(|e| {
        eprintln!("Error loading {}: {}", path.display(), e);
        e.exit_code() as u8
    })
}

fn fail(e: ResolveError) -> u8 {
    eprintln!("Error: {}", e);
    e.exit_code() as u8
}

fn write_output(args: &CommonArgs, value: &impl Serialize) -> Result<(), u8> {
    let json_output = if args.pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &json_output).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", json_output);
        }
    }

    Ok(())
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", serde_json::json!({ "valid": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}
