use pedal_protocol::{PedalFrame, PedalStatus, StatusFrame, UiAction};
use serde_json::Value;
use std::io::{Read, Write};
use tracing::{debug, warn};

use crate::client::{ProtocolError, RpcClient};
use crate::config::{DisplayNames, PresetTable};
use crate::navigator::BankNavigator;

pub const NEXT_PRESET_PARAM: &str = "engine.next_preset";
// The engine's own id for this drops the second "o"; the wire string must
// match the engine, not the dictionary.
pub const PREV_PRESET_PARAM: &str = "engine.previus_preset";

/// What one pedal slot resolved to for the current frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// The slot drives this parameter id.
    Driven(String),
    /// The slot is unmapped and only occupies a status placeholder.
    Empty,
}

/// Looks up the switch list for (bank, preset). A bank missing from the
/// table, or a preset missing within a known bank, falls back to the default
/// list.
pub fn resolve_switches<'t>(table: &'t PresetTable, bank: &str, preset: &str) -> &'t [String] {
    table
        .banks
        .get(bank)
        .and_then(|presets| presets.get(preset))
        .map(|set| set.switches.as_slice())
        .unwrap_or(&table.default.switches)
}

/// Forwards one hardware frame to the engine: each mapped pedal slot becomes
/// a `set` notification. Only `min(pedals, switches)` slots are addressed;
/// indices beyond either bound are never touched.
pub fn apply_frame<S: Read + Write>(
    client: &mut RpcClient<S>,
    frame: &PedalFrame,
    switches: &[String],
) -> Result<Vec<Slot>, ProtocolError> {
    let mut slots = Vec::with_capacity(frame.pedals.len().min(switches.len()));
    for (id, &position) in switches.iter().zip(&frame.pedals) {
        if id.is_empty() {
            slots.push(Slot::Empty);
            continue;
        }
        client.set(id, Value::from(position))?;
        slots.push(Slot::Driven(id.clone()));
    }
    Ok(slots)
}

/// Queries the engine for each driven slot's current value and assembles the
/// controller status frame, preserving slot order. Unmapped slots show the
/// placeholder label.
pub fn build_status<S: Read + Write>(
    client: &mut RpcClient<S>,
    slots: &[Slot],
    names: &DisplayNames,
    bank: &str,
    preset: &str,
) -> Result<StatusFrame, ProtocolError> {
    let mut pedals_onoff = Vec::with_capacity(slots.len());
    for slot in slots {
        match slot {
            Slot::Empty => pedals_onoff.push(PedalStatus::placeholder()),
            Slot::Driven(id) => {
                let result = client.get(id)?;
                let Some((name, value)) = first_entry(&result) else {
                    warn!(%id, "get returned no parameter entry; showing placeholder");
                    pedals_onoff.push(PedalStatus::placeholder());
                    continue;
                };
                pedals_onoff.push(PedalStatus {
                    name: names.resolve(&name).to_string(),
                    value,
                });
            }
        }
    }
    Ok(StatusFrame {
        pedals_onoff,
        bank: bank.to_string(),
        preset: preset.to_string(),
    })
}

/// Translates a controller navigation action into engine traffic. Bank moves
/// go through the navigator (which picks the `setpreset` target); preset
/// moves within a bank are the engine's own cursor.
pub fn apply_ui_action<S: Read + Write>(
    client: &mut RpcClient<S>,
    navigator: &mut BankNavigator,
    action: UiAction,
) -> Result<(), ProtocolError> {
    debug!(?action, "applying ui action");
    match action {
        UiAction::NextBank => announce(client, navigator.advance()),
        UiAction::PrevBank => announce(client, navigator.retreat()),
        UiAction::NextPreset => client.set(NEXT_PRESET_PARAM, Value::from(1)),
        UiAction::PrevPreset => client.set(PREV_PRESET_PARAM, Value::from(1)),
    }
}

fn announce<S: Read + Write>(
    client: &mut RpcClient<S>,
    target: Option<(String, String)>,
) -> Result<(), ProtocolError> {
    match target {
        Some((bank, preset)) => client.setpreset(&bank, &preset),
        None => Ok(()),
    }
}

fn first_entry(result: &Value) -> Option<(String, Value)> {
    let (name, value) = result.as_object()?.iter().next()?;
    Some((name.clone(), value.clone()))
}
