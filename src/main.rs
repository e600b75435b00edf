// ABOUTME: ltc-clock command line entry point
// ABOUTME: Resolves configuration, prepares the process, opens audio output, and runs the generator

use clap::Parser;
use ltc_clock::audio::{list_output_devices, CpalSink, LtcEncoder};
use ltc_clock::config::{CliArgs, FileSettings};
use ltc_clock::sync::{NtpSettings, NtpSynchronizer};
use ltc_clock::{system, ClockContext, Coordinator, Error, GeneratorConfig, SAMPLE_RATE};
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = CliArgs::parse();

    let result = if cli.list_devices {
        print_devices()
    } else {
        run(&cli)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_devices() -> Result<(), Error> {
    for name in list_output_devices()? {
        println!("{}", name);
    }
    Ok(())
}

fn run(cli: &CliArgs) -> Result<(), Error> {
    let file = match FileSettings::load(&cli.config) {
        Ok(file) => file,
        Err(e) => {
            log::warn!("Ignoring config file {}: {}", cli.config.display(), e);
            None
        }
    };
    let config = GeneratorConfig::resolve(cli, file.as_ref());
    let rate = config.frame_rate;

    log::info!(
        "LTC {} on '{}' at {}, {:?} time",
        rate,
        config.device,
        config.level,
        config.zone
    );
    match &config.ntp_server {
        Some(server) => log::info!(
            "NTP server {} every {}s, slew over {}s",
            server,
            config.sync_interval_secs,
            config.slew_period_secs
        ),
        None => log::info!("Using the system clock without NTP discipline"),
    }

    if let Some(core) = config.cpu_core {
        match system::pin_to_core(core) {
            Ok(()) => log::info!("Pinned to CPU core {}", core),
            Err(e) => log::warn!("{}", e),
        }
    }
    if config.lock_memory {
        if let Err(e) = system::lock_memory() {
            log::warn!("{}", e);
        }
    }

    let context = ClockContext::new(config.clock());
    if let Err(e) = system::register_signals(&context.stop) {
        log::warn!("{}", e);
    }

    let sink = CpalSink::open(&config.device, SAMPLE_RATE, rate.nominal_frame_size(SAMPLE_RATE))?;
    let encoder = LtcEncoder::new(SAMPLE_RATE, rate, config.level)?;

    let mut coordinator = Coordinator::new(context.clone());
    if !config.quiet && system::is_console_interactive() {
        coordinator = coordinator.with_display(Box::new(std::io::stdout()));
    }
    if let Some(server) = &config.ntp_server {
        let synchronizer = NtpSynchronizer::new(
            server.clone(),
            NtpSettings::default(),
            config.slew_policy(),
            Arc::clone(&context.offsets),
        );
        coordinator = coordinator.with_sync(synchronizer, config.sync_schedule());
    }

    let report = coordinator.run(sink, encoder)?;
    log::info!(
        "Stopped after {} frames ({} write errors, {} recoveries)",
        report.audio.frames,
        report.audio.write_errors,
        report.audio.recoveries
    );
    Ok(())
}
