//! Reader commands: listing, polling and identification

use std::{sync::Arc, thread};

use smartcas_core::utils::hexdump;
use smartcas_reader::{CardStatus, Reader, ReaderConfig, ReaderState};
use smartcas_transport_pcsc::{PcscConfig, PcscDeviceManager, PcscTransceiver};
use tracing::info;

/// List all available readers
pub(crate) fn list_readers(manager: &PcscDeviceManager) -> eyre::Result<()> {
    let readers = manager.list_readers()?;

    println!("Available readers:");
    for (i, reader) in readers.iter().enumerate() {
        let status = match reader.atr() {
            Some(atr) => format!("card present, ATR {}", hexdump(atr, true)),
            None => "no card".to_string(),
        };
        println!("{}. {} ({})", i + 1, reader.name(), status);
    }

    Ok(())
}

/// Open the configured reader and build its card session engine
pub(crate) fn open_reader(
    manager: &PcscDeviceManager,
    config: &ReaderConfig,
) -> eyre::Result<Reader<PcscTransceiver>> {
    let transceiver = manager.open(config.device.as_deref(), PcscConfig::default())?;
    info!(reader = %config.id, device = transceiver.reader_name(), "Using reader");

    let mut builder = Reader::builder(config.id.clone(), transceiver)
        .card_systems(config.card_systems()?)
        .policy(config.policy());
    if let Some(archive) = config.archive() {
        builder = builder.archive(Arc::new(archive));
    }

    let reader = builder.build();
    reader.init_device()?;
    Ok(reader)
}

/// Poll the card at the configured interval, logging every status change
pub(crate) fn watch_command(
    reader: &Reader<PcscTransceiver>,
    config: &ReaderConfig,
) -> eyre::Result<()> {
    let mut last = None;
    loop {
        reader.check_health();
        let state = reader.state();
        if last != Some(state.status) {
            info!(reader = %reader.id(), status = %state.status, "Card status changed");
            if state.status == CardStatus::Inserted {
                print_state(&state);
            }
            last = Some(state.status);
        }
        thread::sleep(config.poll_interval());
    }
}

/// Run one health check and print what is known about the card
pub(crate) fn identify_command(reader: &Reader<PcscTransceiver>) -> eyre::Result<()> {
    reader.check_health();
    print_state(&reader.state());
    Ok(())
}

fn print_state(state: &ReaderState) {
    println!("Status:      {}", state.status);
    if let Some(atr) = &state.atr {
        println!("ATR:         {atr}");
    }
    match state.card_system {
        Some(kind) => println!("Card system: {kind}"),
        None if state.status.is_present() => println!("Card system: not supported"),
        None => return,
    }

    let card = &state.card;
    println!("CA id:       {}", card.caid);
    println!("Serial:      {}", hexdump(&card.hex_serial, false));
    for provider in card.provider_ids.iter().take(card.provider_count) {
        println!("Provider:    {}", hexdump(provider, false));
    }
}
