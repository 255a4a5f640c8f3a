use clap::{Parser, Subcommand, ValueEnum};
use dropbox_tools::app::App;
use dropbox_tools::errors::ToolError;
use dropbox_tools::mcp::catalog::{list_tools, list_tools_for_openai, validate_tool_args};
use serde_json::Value;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "dropbox-tools", version, about = "Dropbox API tools for LLM tool calling")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve MCP JSON-RPC over stdio (default)
    Serve,
    /// Print every tool definition as JSON
    Tools {
        #[arg(long, value_enum, default_value_t = Format::Mcp)]
        format: Format,
    },
    /// Run one tool and print its result
    Call {
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(long)]
        args: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Mcp,
    Openai,
}

async fn call(tool: &str, raw_args: Option<&str>) -> Result<Value, ToolError> {
    let args: Value = match raw_args {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|err| ToolError::invalid_params(format!("--args is not valid JSON: {}", err)))?,
        None => Value::Object(Default::default()),
    };
    let app = App::initialize()?;
    if !app.tool_executor.has_tool(tool) {
        return Err(app.tool_executor.unknown_tool_error(tool));
    }
    validate_tool_args(tool, &args).map_err(|err| ToolError::invalid_params(err.message))?;
    app.tool_executor.execute(tool, args).await
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(err) => eprintln!("dropbox-tools: {}", err),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            if let Err(err) = dropbox_tools::mcp::server::run_stdio().await {
                eprintln!("dropbox-tools: {}", err);
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Command::Tools { format } => {
            let tools = match format {
                Format::Mcp => serde_json::to_value(list_tools()).unwrap_or(Value::Null),
                Format::Openai => Value::Array(list_tools_for_openai()),
            };
            print_json(&tools);
            ExitCode::SUCCESS
        }
        Command::Call { tool, args } => match call(&tool, args.as_deref()).await {
            Ok(envelope) => {
                print_json(&envelope);
                ExitCode::SUCCESS
            }
            Err(err) => {
                print_json(&err.to_payload());
                ExitCode::FAILURE
            }
        },
    }
}
