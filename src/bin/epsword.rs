// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use epsword::{
    auth::resolve_credentials,
    config::Settings,
    deposit::DepositTemplate,
    descriptor::Descriptor,
    path::{default_settings_path, expand_path},
    prompt::{ask_password, ask_upload_dir, InquireOperator, Operator, Unattended},
    reconcile::{Engine, Outcome, RunOptions},
    sword::{transport::HttpTransport, Endpoints, SwordClient},
};

use anyhow::{bail, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::{path::PathBuf, process::exit};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(about, version, override_usage = "\n  epsword [options]")]
struct Cli {
    /// Upload directory of experiment, asked for if absent.
    #[arg(short, long, value_name = "path")]
    pub path: Option<PathBuf>,

    /// Catalog entry to update if descriptor records none.
    #[arg(short = 'i', long, value_name = "epid")]
    pub epid: Option<u64>,

    /// User to authenticate as.
    #[arg(short, long, value_name = "user")]
    pub user: Option<String>,

    /// Log debug information.
    #[arg(short, long)]
    pub verbose: bool,

    /// Upload even if remote files look up to date.
    #[arg(short, long)]
    pub force: bool,

    /// Update existing entries without asking.
    #[arg(short, long)]
    pub auto: bool,

    /// Deposit into live server instead of test server.
    #[arg(long, env = "USE_LIVE_SERVER")]
    pub live: bool,

    /// Settings file to use instead of the default one.
    #[arg(long, value_name = "path")]
    pub config: Option<PathBuf>,
}

impl Cli {
    fn run(self) -> Result<()> {
        let mut settings = match &self.config {
            Some(path) => Settings::load(expand_path(path))?,
            None => Settings::load(default_settings_path()?)?,
        };
        if self.live {
            settings.use_live_server();
        }
        info!("deposit into {}", settings.base_url());

        let upload_dir = match self.path {
            Some(path) => expand_path(path),
            None => expand_path(ask_upload_dir()?),
        };
        if !upload_dir.is_dir() {
            bail!("upload directory {:?} does not exist", upload_dir.display());
        }

        let mut credentials = resolve_credentials(self.user.as_deref(), settings.host());
        if let Some(creds) = credentials.as_mut() {
            if creds.password.is_none() {
                creds.password = Some(ask_password(&creds.login)?);
            }
        }

        let mut descriptor = Descriptor::find(&upload_dir)?;
        info!("use descriptor {:?}", descriptor.path().display());

        let template = DepositTemplate {
            username: credentials.as_ref().map(|creds| creds.login.clone()),
            home_institution: settings.home_institution.clone(),
            ..Default::default()
        };
        let transport = HttpTransport::new(settings.verify_tls, credentials)?;
        let client = SwordClient::new(Endpoints::new(settings.base_url()), transport);
        let engine = Engine::new(client, template, settings.staleness.clone());

        let bar = ProgressBar::new(0);
        bar.set_style(ProgressStyle::with_template("{spinner} [{pos}/{len}] {msg}")?);
        let mut operator: Box<dyn Operator> = if self.auto {
            Box::new(Unattended)
        } else {
            Box::new(InquireOperator::new(bar.clone()))
        };

        let options = RunOptions {
            epid: self.epid,
            force: self.force,
        };
        let outcome = engine.run(&upload_dir, &mut descriptor, &options, operator.as_mut(), &bar)?;

        match outcome {
            Outcome::Finished => info!("nothing to do, experiment is finished"),
            Outcome::Declined => info!("nothing was uploaded"),
            Outcome::UpToDate { epid } => info!("entry {epid} is up to date"),
            Outcome::IndexMissing { epid, index } => {
                warn!("entry {epid} left as is, {:?} is missing", index.display())
            }
            Outcome::Uploaded { epid, report } => {
                info!("uploaded {} file(s) into entry {epid}", report.uploaded.len());
                for path in &report.failed {
                    warn!("failed to upload {:?}", path.display());
                }
                for path in &report.skipped {
                    warn!("skipped {:?}", path.display());
                }
            }
        }

        Ok(())
    }
}

fn main() {
    let cli = Cli::parse();

    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = cli.run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}
