use std::env;
use std::process;
use std::thread;

use crossbeam_channel::unbounded;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

mod config;
use config::Config;

mod destination;

mod error;

mod ssh;
use ssh::SSH;

mod remote;

mod pipeline;
use pipeline::{Pipeline, Plan};

mod progress_message;
use progress_message::Progress;

mod output;
use output::run_output;


fn main() {
    let args = config::command().get_matches_from(config::normalize_args(env::args_os()));
    let verbose = args.is_present("verbose");
    init_logging(verbose);

    let cfg = match Config::from_matches(&args) {
        Ok(c) => c,
        Err(err) => {
            tracing::error!("{err:#}");
            process::exit(1);
        }
    };
    if let Some(t) = &cfg.ignored_file_type {
        tracing::warn!("-t {t} is not supported, ignoring it");
    }
    if cfg.verbose {
        tracing::debug!("Using libssh {}", SSH::version());
    }

    tracing::info!(
        "Local file will be uploaded to datastore \"{}\" in \"{}\"",
        cfg.staging.container,
        cfg.staging.relative_path
    );
    tracing::info!(
        "Final disk file will be on datastore \"{}\" in \"{}\"",
        cfg.destination.container,
        cfg.destination.path
    );

    let (progress_sender, output_thread) = if cfg.quiet {
        (None, None)
    } else {
        let (sender, receiver) = unbounded::<Progress>();
        match thread::Builder::new()
            .name("upload progress".to_string())
            .spawn(move || run_output(receiver))
        {
            Ok(handle) => (Some(sender), Some(handle)),
            Err(err) => {
                tracing::warn!("no progress display: {err}");
                (None, None)
            }
        }
    };

    let plan = Plan::new(cfg.local_file, cfg.destination, cfg.staging);
    let mut pipeline = Pipeline::new(plan);
    let connect = &cfg.connect;
    let res = pipeline.run(|| {
        tracing::info!("Connecting to {} as user {}", connect.host, connect.user);
        let ssh = SSH::connect(connect)?;
        Ok(match progress_sender {
            Some(sender) => ssh.with_progress(sender),
            None => ssh,
        })
    });

    // the session held the only sender and is gone now, so this returns
    if let Some(handle) = output_thread {
        let _ = handle.join();
    }

    if let Err(err) = res {
        tracing::debug!(stage = ?pipeline.stage(), "last completed stage");
        tracing::error!("{err}");
        process::exit(1);
    }
}

// RUST_LOG overrides the level picked by -v.
// warnings and errors go to stderr, the rest to stdout.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr.with_max_level(Level::WARN).or_else(std::io::stdout))
        .with_target(false)
        .init();
}
