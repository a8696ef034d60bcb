//! shell-runner binary entry point.

use std::process::ExitCode;

use shell_runner::cli::{self, Args};
use shell_runner::config::Config;
use shell_runner::{
    line_callback, logging, Command, CompletionCallback, ExecutionResult, TaskRegistry,
};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

const TASK_ID: &str = "main";

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Try 'shell-runner --help' for more information.");
            return ExitCode::from(2);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }

    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(2);
        }
    };

    let _ = logging::init_with_filter(config.log_filter());

    let Some(command) = args.command.clone() else {
        eprintln!("error: no command given");
        eprintln!("Try 'shell-runner --help' for more information.");
        return ExitCode::from(2);
    };

    match run(&args, &config, command).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(
    args: &Args,
    config: &Config,
    command: String,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let executor_config = config.to_executor_config()?;
    info!(
        "shell-runner v{} (timeout: {:?})",
        env!("CARGO_PKG_VERSION"),
        executor_config.default_timeout
    );

    let registry = TaskRegistry::with_config(Handle::current(), executor_config);

    let on_line = (!args.quiet).then(|| line_callback(|line| println!("{}", line)));
    let (tx, rx) = oneshot::channel();
    let on_complete: CompletionCallback = Box::new(move |_, result| {
        let _ = tx.send(result.clone());
    });

    registry.submit(TASK_ID, Command::new(command), on_line, Some(on_complete))?;

    let interrupt = {
        let registry = registry.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling command");
                registry.cancel_task(TASK_ID);
            }
        })
    };

    let result = rx.await?;
    interrupt.abort();

    report(args, &result)?;
    Ok(exit_code_for(&result))
}

fn report(args: &Args, result: &ExecutionResult) -> Result<(), serde_json::Error> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    if args.quiet {
        print!("{}", result.stdout);
        eprint!("{}", result.stderr);
    }

    eprintln!(
        "[{}] exit {} in {:.3}s",
        result.status,
        result.return_code,
        result.execution_time.as_secs_f64()
    );
    if let Some(ref message) = result.error_message {
        eprintln!("{}", message);
    }
    Ok(())
}

fn exit_code_for(result: &ExecutionResult) -> ExitCode {
    match u8::try_from(result.return_code) {
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    }
}
