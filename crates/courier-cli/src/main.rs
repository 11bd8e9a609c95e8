//! Courier CLI - send one text message through the messenger core
//!
//! Drives the messenger over a loopback transport with an outgoing window
//! of 2 and automatic settlement, then dumps the delivery status around an
//! explicit cumulative settle. Any core error terminates the process with a
//! `file:line: message` diagnostic and exit code 1, polled from the
//! messenger's last-error slot after each call.

mod cli;

use tracing::debug;

use courier_core::{
    DeliveryInfo, Disposition, LoopbackTransport, Message, Messenger, MessengerConfig, SettleMode,
};

use cli::Cli;

macro_rules! check {
    ($messenger:expr) => {
        if let Some(err) = $messenger.last_error() {
            die(file!(), line!(), &err.to_string());
        }
    };
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse_or_die();
    setup_logging(cli.verbose);

    let config = MessengerConfig::default().with_window(2).with_auto_settle(true);
    let mut messenger = Messenger::with_config(config, Box::new(LoopbackTransport::new()));

    let _ = messenger.start().await;
    check!(messenger);

    let _ = messenger.put(Message::text(cli.address.as_str(), cli.message.as_str()));
    check!(messenger);

    if let Ok(outcome) = messenger.send(None).await {
        debug!(sent = outcome.sent, "send complete");
    }
    check!(messenger);

    if let Some(tracker) = messenger.outgoing_tracker() {
        report_delivery(1, " before settle", messenger.status(tracker).ok().flatten());
        let _ = messenger.settle(tracker, SettleMode::Cumulative);
        check!(messenger);
        report_delivery(1, " after settle", messenger.status(tracker).ok().flatten());
    }

    let _ = messenger.stop().await;
    check!(messenger);
}

/// Print a one-line diagnostic and terminate with exit code 1
fn die(file: &str, line: u32, message: &str) -> ! {
    eprintln!("{file}:{line}: {message}");
    std::process::exit(1);
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

/// Dump a delivery snapshot, one observation per line
fn report_delivery(phase: u32, subphase: &str, info: Option<DeliveryInfo>) {
    let Some(info) = info else {
        println!("{phase}{subphase}: no delivery information");
        return;
    };

    if info.settled {
        println!("{phase}{subphase}: delivery settled");
    } else if info.flags.partial {
        println!("{phase}{subphase}: delivery partial");
    } else if info.flags.updated {
        println!("{phase}{subphase}: delivery updated");
    } else if info.flags.readable {
        println!("{phase}{subphase}: delivery readable");
    } else if info.flags.writable {
        println!("{phase}{subphase}: delivery writable");
    } else {
        println!("{phase}{subphase}: delivery state unknown");
    }

    if info.local != Disposition::None {
        println!("{phase}{subphase}: local {}", info.local.name());
    }
    if info.remote != Disposition::None {
        println!("{phase}{subphase}: remote {}", info.remote.name());
    }
}
