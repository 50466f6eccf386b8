//! JSON register scripts.
//!
//! A script is an array of events replayed in order against an [`Apu`]:
//!
//! ```json
//! [
//!   { "op": "chips", "mask": 1 },
//!   { "op": "write", "address": "$4015", "value": 15 },
//!   { "op": "write", "address": "0x4000", "value": "0xBF" },
//!   { "op": "wait", "cycles": 29829 },
//!   { "op": "frames", "count": 2 }
//! ]
//! ```
//!
//! Addresses and values are JSON numbers or hex strings (`$xx` / `0xxx`).

use apu_core::{Apu, ChipMask, TimingMode};
use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptEvent {
    /// Owe the APU this many CPU cycles
    Wait { cycles: i32 },
    /// Owe the APU whole audio frames
    Frames { count: u32 },
    Write {
        #[serde(deserialize_with = "hex_u16")]
        address: u16,
        #[serde(deserialize_with = "hex_u8")]
        value: u8,
    },
    ExternalWrite {
        #[serde(deserialize_with = "hex_u16")]
        address: u16,
        #[serde(deserialize_with = "hex_u8")]
        value: u8,
    },
    Chips {
        #[serde(deserialize_with = "hex_u8")]
        mask: u8,
    },
    Machine { machine: TimingMode },
    Reset,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrHex {
    Number(u64),
    Text(String),
}

fn parse_number(text: &str) -> Option<u64> {
    let text = text.trim();
    if let Some(hex) = text
        .strip_prefix('$')
        .or_else(|| text.strip_prefix("0x"))
        .or_else(|| text.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}

fn hex_value<'de, D: Deserializer<'de>>(deserializer: D, max: u64) -> Result<u64, D::Error> {
    use serde::de::Error;

    let value = match NumberOrHex::deserialize(deserializer)? {
        NumberOrHex::Number(n) => n,
        NumberOrHex::Text(text) => parse_number(&text)
            .ok_or_else(|| D::Error::custom(format!("not a number: {:?}", text)))?,
    };
    if value > max {
        return Err(D::Error::custom(format!(
            "{:#X} is out of range (max {:#X})",
            value, max
        )));
    }
    Ok(value)
}

fn hex_u16<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    hex_value(deserializer, u16::MAX as u64).map(|v| v as u16)
}

fn hex_u8<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    hex_value(deserializer, u8::MAX as u64).map(|v| v as u8)
}

pub fn parse(text: &str) -> Result<Vec<ScriptEvent>, serde_json::Error> {
    serde_json::from_str(text)
}

/// Replay `events` and emulate all time they owe.
pub fn run(apu: &mut Apu, events: &[ScriptEvent]) {
    for event in events {
        match *event {
            ScriptEvent::Wait { cycles } => apu.add_time(cycles),
            ScriptEvent::Frames { count } => add_frames(apu, count),
            ScriptEvent::Write { address, value } => apu.write(address, value),
            ScriptEvent::ExternalWrite { address, value } => apu.external_write(address, value),
            ScriptEvent::Chips { mask } => apu.set_external_sound(ChipMask::from_bits(mask)),
            ScriptEvent::Machine { machine } => apu.change_machine(machine),
            ScriptEvent::Reset => apu.reset(),
        }
    }
    apu.process();
}

/// Owe `count` full audio frames, in chunks that fit the time argument.
pub fn add_frames(apu: &mut Apu, count: u32) {
    let frame = apu.frame_cycle_count() as i32;
    for _ in 0..count {
        apu.add_time(frame);
        apu.process();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apu_core::{BufferedSink, SampleBank};

    #[test]
    fn test_parse_hex_and_decimal() {
        let events = parse(
            r#"[
                { "op": "write", "address": "$4015", "value": 15 },
                { "op": "external_write", "address": "0x9000", "value": "$8F" },
                { "op": "wait", "cycles": 100 },
                { "op": "chips", "mask": "0x3F" },
                { "op": "machine", "machine": "pal" },
                { "op": "reset" }
            ]"#,
        )
        .unwrap();

        assert_eq!(
            events,
            vec![
                ScriptEvent::Write {
                    address: 0x4015,
                    value: 15
                },
                ScriptEvent::ExternalWrite {
                    address: 0x9000,
                    value: 0x8F
                },
                ScriptEvent::Wait { cycles: 100 },
                ScriptEvent::Chips { mask: 0x3F },
                ScriptEvent::Machine {
                    machine: TimingMode::Pal
                },
                ScriptEvent::Reset,
            ]
        );
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(parse(r#"[{ "op": "write", "address": 16384, "value": 256 }]"#).is_err());
        assert!(parse(r#"[{ "op": "write", "address": "$zz", "value": 1 }]"#).is_err());
        assert!(parse(r#"[{ "op": "jump" }]"#).is_err());
    }

    #[test]
    fn test_run_renders_frames() {
        let sink = BufferedSink::new();
        let mut apu = Apu::new(Box::new(sink.clone()), Box::new(SampleBank::default())).unwrap();
        let events = parse(
            r#"[
                { "op": "chips", "mask": 1 },
                { "op": "write", "address": "$4015", "value": 1 },
                { "op": "write", "address": "$4000", "value": "$BF" },
                { "op": "write", "address": "$4002", "value": "$FD" },
                { "op": "write", "address": "$4003", "value": "$08" },
                { "op": "frames", "count": 2 },
                { "op": "wait", "cycles": 1000 }
            ]"#,
        )
        .unwrap();

        run(&mut apu, &events);
        assert_eq!(sink.frames(), 2);
        assert_eq!(apu.frame_cycles(), 1000);
        assert!(sink.take().iter().any(|&s| s != 0));
    }
}
