use std::io::{Read, Write};
use std::net::TcpStream;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client::{ProtocolError, RpcClient};
use crate::config::{DisplayNames, PresetTable};
use crate::hardware::{HardwareBridge, HardwareError};
use crate::navigator::BankNavigator;
use crate::router;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Rpc(#[from] ProtocolError),
    #[error(transparent)]
    Hardware(#[from] HardwareError),
}

/// Everything the control loop mutates, held in one place: the RPC session,
/// the navigation cursor, and the read-only tables.
pub struct Session<S> {
    client: RpcClient<S>,
    navigator: BankNavigator,
    presets: PresetTable,
    names: DisplayNames,
}

impl<S: Read + Write> Session<S> {
    /// Brings a fresh RPC session into a known state: enumerate parameters,
    /// load the bank listing, report where the engine currently is, and
    /// announce bank zero's first preset.
    pub fn start(
        mut client: RpcClient<S>,
        presets: PresetTable,
        names: DisplayNames,
    ) -> Result<Self, ProtocolError> {
        let ids = client.parameter_list()?;
        info!(count = ids.len(), "engine parameter list loaded");
        for id in &ids {
            debug!(%id, "engine parameter");
        }

        let banks = client.banks()?;
        info!(count = banks.len(), "bank listing loaded");
        let mut navigator = BankNavigator::new(banks);

        let (bank, preset) = client.current_preset()?;
        info!(%bank, %preset, "engine preset at startup");

        if let Some((bank, preset)) = navigator.advance() {
            client.setpreset(&bank, &preset)?;
        }

        Ok(Self {
            client,
            navigator,
            presets,
            names,
        })
    }

    /// One loop iteration: resolve the active switch list, forward one
    /// hardware frame, and push the resulting status back. A timed-out
    /// hardware read skips the iteration.
    pub fn step<H: Read + Write>(
        &mut self,
        hardware: &mut HardwareBridge<H>,
    ) -> Result<(), SessionError> {
        let (bank, preset) = self.client.current_preset()?;
        let switches = router::resolve_switches(&self.presets, &bank, &preset);

        let Some(frame) = hardware.read_frame()? else {
            debug!("no pedal frame this interval");
            return Ok(());
        };

        let slots = router::apply_frame(&mut self.client, &frame, switches)?;
        if let Some(action) = frame.ui_action {
            router::apply_ui_action(&mut self.client, &mut self.navigator, action)?;
        }

        let status = router::build_status(&mut self.client, &slots, &self.names, &bank, &preset)?;
        hardware.write_status(&status)?;
        Ok(())
    }
}

/// Drives the session against the serial controller until the RPC side
/// fails. Hardware failures abandon the iteration and reopen the port;
/// engine and navigation state carry over.
pub fn run(mut session: Session<TcpStream>, serial_path: &str) -> Result<(), ProtocolError> {
    let mut hardware = HardwareBridge::open_retry(serial_path);
    info!(serial_path, "pedal controller connected");
    loop {
        match session.step(&mut hardware) {
            Ok(()) => {}
            Err(SessionError::Rpc(e)) => return Err(e),
            Err(SessionError::Hardware(e)) => {
                warn!(error = %e, "pedal controller i/o failed; reopening port");
                hardware = HardwareBridge::open_retry(serial_path);
            }
        }
    }
}
