// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    clap::{Arg, ArgMatches, Command},
    debian_mirror::{
        config::{MirrorConfig, MirrorSettings},
        download::DownloadEvent,
        error::MirrorError,
        mirror::MirrorPass,
        repository::http::HttpFetcher,
        sanitize::sanitize_uri,
    },
    log::LevelFilter,
    std::sync::{Arc, Mutex},
    thiserror::Error,
};

const CONFIG_ABOUT: &str = "\
# YAML Configuration

The mirror is configured by a YAML file with the following keys. Only
`sources` is needed in practice.

sources (list[string])
   Repositories to mirror, in sources.list syntax. e.g.

      deb [arch=amd64,arm64] http://deb.debian.org/debian bullseye main contrib
      deb-src http://deb.debian.org/debian bullseye main
      deb http://example.com/flat-repository

   Lines without `[arch=...]` use `default_architecture`. Lines without a
   distribution and components describe flat repositories.

sources_file (optional) (string)
   Path of a sources.list style file whose lines are added to `sources`.

base_path (optional) (string)
   Directory holding the `mirror`, `skel` and `var` directories. Defaults to
   /var/spool/debian-mirror.

mirror_path, skel_path, var_path (optional) (string)
   Override the location of an individual directory.

default_architecture (optional) (string)
   Defaults to the architecture of this machine.

threads (optional) (int)
   Number of parallel downloads. Defaults to the number of CPUs.

retries (optional) (int)
   How many times a failed download is retried. Defaults to 5.

limit_rate (optional) (string)
   Bandwidth limit per download in bytes per second. Accepts `k` and `m`
   suffixes, e.g. `500k`.

contents (optional) (bool)
   Whether to mirror Contents files. Defaults to true.

by_hash (optional) (bool)
   Whether to mirror by-hash copies of translation and AppStream files.

force (optional) (bool)
   Process every package index as if it changed.

clean (optional) (bool)
   Whether to remove files no longer referenced. Defaults to true.

disable_clean (optional) (list[string])
   Repository URLs excluded from cleaning.

no_check_certificate, ca_certificate, certificate, private_key, proxy
   TLS and proxy settings of the HTTP client.
";

#[derive(Debug, Error)]
pub enum DmtError {
    #[error("argument parsing error: {0:?}")]
    Clap(#[from] clap::Error),

    #[error("{0}")]
    Mirror(#[from] MirrorError),

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("{0} downloads failed")]
    IncompleteMirror(usize),

    #[error("invalid sub-command: {0}")]
    InvalidSubCommand(String),
}

pub type Result<T> = std::result::Result<T, DmtError>;

pub async fn run_cli() -> Result<()> {
    let app = Command::new("Debian Mirror Tool")
        .version("0.1")
        .author("Gregory Szorc <gregory.szorc@gmail.com>")
        .about("Mirror Debian repositories")
        .arg_required_else_help(true);

    let app = app
        .arg(
            Arg::new("threads")
                .long("--threads")
                .takes_value(true)
                .global(true)
                .help("Number of parallel downloads (overrides the configuration)"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .multiple_occurrences(true)
                .help("Increase logging verbosity. Can be specified multiple times."),
        );

    let config_arg = Arg::new("config")
        .long("--config")
        .takes_value(true)
        .required(true)
        .allow_invalid_utf8(true)
        .help("Path to a YAML file defining the mirror configuration");

    let app = app.subcommand(
        Command::new("mirror")
            .about("Run a mirror pass")
            .long_about(CONFIG_ABOUT)
            .arg(config_arg.clone()),
    );

    let app = app.subcommand(
        Command::new("indexes")
            .about("Print the metadata URLs a mirror pass would download")
            .arg(config_arg),
    );

    let mut app = app.subcommand(
        Command::new("sanitize")
            .about("Print the local path of a URL")
            .arg(Arg::new("url").required(true).help("URL to convert")),
    );

    let matches = app.clone().get_matches();

    let log_level = match matches.occurrences_of("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    if log_level == LevelFilter::Info {
        builder.filter_module("rustls", LevelFilter::Error);
    }

    builder.init();

    match matches.subcommand() {
        Some(("mirror", args)) => command_mirror(args).await,
        Some(("indexes", args)) => command_indexes(args),
        Some(("sanitize", args)) => command_sanitize(args),
        Some((command, _)) => Err(DmtError::InvalidSubCommand(command.to_string())),
        None => {
            app.print_help()?;
            Ok(())
        }
    }
}

fn load_settings(args: &ArgMatches) -> Result<MirrorSettings> {
    let config_path = args
        .value_of_os("config")
        .expect("config argument is required");

    let mut settings = MirrorConfig::from_yaml_path(config_path)?.into_settings()?;

    if args.is_present("threads") {
        settings.threads = args.value_of_t::<usize>("threads")?.max(1);
    }

    Ok(settings)
}

/// Progress bar state of the current download batch.
struct BatchProgress {
    bar: pbr::ProgressBar<std::io::Stdout>,
    remaining: usize,
}

async fn command_mirror(args: &ArgMatches) -> Result<()> {
    let settings = load_settings(args)?;
    let fetcher = HttpFetcher::new(&settings)?;

    let pb: Arc<Mutex<Option<BatchProgress>>> = Arc::new(Mutex::new(None));

    let cb = Box::new(move |event: DownloadEvent| match event {
        DownloadEvent::BatchStarted(_, count) => {
            println!("{}", event);

            let mut bar = pbr::ProgressBar::new(count as u64);
            bar.show_speed = false;

            pb.lock().unwrap().replace(BatchProgress {
                bar,
                remaining: count,
            });
        }
        DownloadEvent::Downloaded(..)
        | DownloadEvent::NotModified(_)
        | DownloadEvent::NotFound(_)
        | DownloadEvent::Failed(..) => {
            let mut guard = pb.lock().unwrap();

            if let Some(progress) = guard.as_mut() {
                progress.bar.inc();
                progress.remaining -= 1;

                if progress.remaining == 0 {
                    progress.bar.finish();
                    guard.take();
                }
            }
        }
        DownloadEvent::Retrying(..) => {}
    });

    let mut pass = MirrorPass::new(&settings, &fetcher);
    let report = pass.run(&Some(cb)).await?;

    println!("{}", report);

    if report.is_success() {
        Ok(())
    } else {
        Err(DmtError::IncompleteMirror(
            report.indexes.failed
                + report.translations.failed
                + report.dep11.failed
                + report.archives.failed,
        ))
    }
}

fn command_indexes(args: &ArgMatches) -> Result<()> {
    let settings = load_settings(args)?;
    let fetcher = HttpFetcher::new(&settings)?;

    for url in MirrorPass::new(&settings, &fetcher).index_urls() {
        println!("{}", url);
    }

    Ok(())
}

fn command_sanitize(args: &ArgMatches) -> Result<()> {
    let url = args.value_of("url").expect("url argument is required");

    println!("{}", sanitize_uri(url));

    Ok(())
}
