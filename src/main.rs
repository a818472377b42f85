use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tender_pilot::browser::{ChromeBrowser, DriverSession};
use tender_pilot::captcha::TwoCaptchaClient;
use tender_pilot::cli::{Cli, Command};
use tender_pilot::core::Config;
use tender_pilot::logging;
use tender_pilot::status::StatusFile;
use tender_pilot::store::MySqlStore;
use tender_pilot::workflow::{Orchestrator, TerminalOutcome, WorkflowState};
use tracing::{error, info, warn};

const LOGIN_LOG: &str = "login.log";

fn reject(message: impl std::fmt::Display) -> ExitCode {
    eprintln!("{}", message);
    println!("{}", TerminalOutcome::LoginFailed.token().unwrap_or_default());
    ExitCode::FAILURE
}

async fn open(config: &Config) -> anyhow::Result<Orchestrator<ChromeBrowser, MySqlStore>> {
    let store = MySqlStore::connect(&config.database)
        .await
        .context("connecting to the database")?;
    let session = DriverSession::new(ChromeBrowser::new(), config.clone())
        .await
        .context("launching the browser")?;

    let orchestrator = Orchestrator::new(session, store);
    Ok(match TwoCaptchaClient::from_config(&config.captcha) {
        Ok(solver) => orchestrator.with_captcha(Arc::new(solver)),
        Err(e) => {
            warn!(error = %e, "captcha solving unavailable");
            orchestrator
        }
    })
}

async fn finish(orchestrator: Orchestrator<ChromeBrowser, MySqlStore>) {
    if let Err(e) = orchestrator.shutdown().await {
        warn!(error = %e, "browser did not close cleanly");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => return reject(e),
    };
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return reject(format!("configuration: {}", e)),
    };

    let outcome = match cli.command {
        Command::Login(args) => {
            let _guard = match logging::init("info", Some((config.paths.status_dir.as_path(), LOGIN_LOG))) {
                Ok(guard) => guard,
                Err(e) => return reject(format!("logging: {}", e)),
            };
            let params = args.into_params();
            match open(&config).await {
                Ok(mut orchestrator) => {
                    let outcome = orchestrator.run_login(&params).await;
                    finish(orchestrator).await;
                    outcome
                }
                Err(e) => {
                    error!(error = %format!("{:#}", e), "login run could not start");
                    TerminalOutcome::LoginFailed
                }
            }
        }
        Command::Submit(args) => {
            let job = match args.into_job() {
                Ok(job) => job,
                Err(e) => return reject(e),
            };
            let log_dir = config.artifacts_dir_for(&job.rut_user);
            let log_name = logging::job_log_name("postulacion", &job.tender);
            let _guard = match logging::init("info", Some((log_dir.as_path(), log_name.as_str()))) {
                Ok(guard) => guard,
                Err(e) => return reject(format!("logging: {}", e)),
            };
            info!(tender = %job.tender, log = %log_dir.join(&log_name).display(), "job log");

            match open(&config).await {
                Ok(mut orchestrator) => {
                    let outcome = orchestrator.run_submission(job).await;
                    finish(orchestrator).await;
                    outcome
                }
                Err(e) => {
                    let reason = format!("{:#}", e);
                    error!(error = %reason, "submission could not start");
                    let status = StatusFile::for_tender(&config.paths.status_dir, &job.tender);
                    let text = format!("Error en {}: {}", WorkflowState::Unauthenticated, reason);
                    if let Err(e) = status.write(&text).await {
                        warn!(error = %e, "could not record failure in status file");
                    }
                    TerminalOutcome::Aborted {
                        state: WorkflowState::Unauthenticated,
                        reason,
                    }
                }
            }
        }
    };

    if let Some(token) = outcome.token() {
        println!("{}", token);
    }
    if outcome.exit_code() == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
