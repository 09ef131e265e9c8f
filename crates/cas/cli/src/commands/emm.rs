//! Archived EMM commands

use std::path::Path;

use smartcas_core::{EmmPacket, utils::hexdump};
use smartcas_reader::{DirArchive, EmmOutcome, Reader, archive::text_record};
use smartcas_transport_pcsc::PcscTransceiver;

/// Decode an archived binary EMM and print it
pub(crate) fn inspect_command(path: &Path) -> eyre::Result<()> {
    let packet = DirArchive::load(path)?;
    print_packet(&packet);
    Ok(())
}

/// Send an archived EMM to the card through the reader's policy
pub(crate) fn replay_command(reader: &Reader<PcscTransceiver>, path: &Path) -> eyre::Result<()> {
    let packet = DirArchive::load(path)?;
    print_packet(&packet);

    let outcome = reader.process_emm(&packet);
    match outcome {
        EmmOutcome::Serviced(code) => println!("EMM written, result {code}"),
        EmmOutcome::Declined => println!("EMM declined by card system"),
        EmmOutcome::Blocked { nano } => println!("EMM blocked by policy (nano {nano:02X})"),
        EmmOutcome::Unavailable => eyre::bail!("reader {} has no usable card", reader.id()),
    }
    Ok(())
}

fn print_packet(packet: &EmmPacket) {
    let scope = if packet.is_unique() { "unique" } else { "shared" };
    println!("Nano:        {:02X} ({scope})", packet.nano());
    println!("CA id:       {}", packet.caid());
    println!("Provider:    {}", hexdump(&packet.provider_id(), false));
    println!("Serial:      {}", hexdump(&packet.hex_serial(), false));
    println!("Type:        {}", packet.emm_type());
    println!("Length:      {}", packet.section().len());
    println!("{}", text_record(packet));
}
