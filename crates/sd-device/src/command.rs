//! The device's command set.
//!
//! Each verb maps to a [`CommandSpec`]: the parameter names (whose count is the
//! arity the dispatcher enforces) and a plain `fn` handler. Handlers receive
//! the raw argument tokens and do their own parsing, so a malformed number is
//! a handler error, not a protocol error.

use sd_controls::PidGains;
use sd_core::{Real, parse_real, parse_uint};

use crate::device::Device;
use crate::error::DeviceResult;

/// Handler signature: raw argument tokens in, optional response text out.
pub type Handler = fn(&Device, &[&str]) -> DeviceResult<Option<String>>;

/// One entry of the command table.
#[derive(Clone, Copy)]
pub struct CommandSpec {
    pub verb: &'static str,
    pub params: &'static [&'static str],
    pub handler: Handler,
}

impl CommandSpec {
    /// Number of arguments the verb expects.
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("verb", &self.verb)
            .field("params", &self.params)
            .finish()
    }
}

const CHANNEL: &str = "Channel Num";

static COMMANDS: &[CommandSpec] = &[
    CommandSpec { verb: "KILL", params: &[], handler: kill },
    CommandSpec { verb: "*IDN?", params: &[], handler: identify },
    CommandSpec { verb: "SCLR?", params: &[], handler: scalar },
    CommandSpec { verb: "NCHAN?", params: &[], handler: channel_count },
    CommandSpec { verb: "READ?", params: &[CHANNEL], handler: read },
    CommandSpec { verb: "SP", params: &[CHANNEL, "Set Point"], handler: set_setpoint },
    CommandSpec { verb: "RR?", params: &[CHANNEL], handler: ramp_rate },
    CommandSpec { verb: "RR", params: &[CHANNEL, "Ramp Rate"], handler: set_ramp_rate },
    CommandSpec { verb: "ATSP?", params: &[CHANNEL], handler: at_setpoint },
    CommandSpec { verb: "STOP", params: &[CHANNEL], handler: stop },
    CommandSpec { verb: "DEBUG", params: &["Log Level"], handler: debug_level },
    CommandSpec { verb: "PID?", params: &[CHANNEL], handler: gains },
    CommandSpec { verb: "SETPID", params: &[CHANNEL, "P", "I", "D"], handler: set_gains },
];

/// Read-only verb lookup, shared by every connection.
#[derive(Debug, Clone, Copy)]
pub struct CommandTable {
    specs: &'static [CommandSpec],
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl CommandTable {
    /// The full command set of the device.
    pub fn standard() -> Self {
        Self { specs: COMMANDS }
    }

    /// Find the entry for `verb` (case-sensitive).
    pub fn lookup(&self, verb: &str) -> Option<&'static CommandSpec> {
        self.specs.iter().find(|spec| spec.verb == verb)
    }

    pub fn specs(&self) -> &'static [CommandSpec] {
        self.specs
    }
}

fn flag(value: bool) -> String {
    String::from(if value { "1" } else { "0" })
}

fn format_gains(gains: PidGains) -> String {
    format!("P:{},I:{},D:{}", gains.kp, gains.ki, gains.kd)
}

fn kill(device: &Device, _args: &[&str]) -> DeviceResult<Option<String>> {
    device.kill();
    Ok(None)
}

fn identify(device: &Device, _args: &[&str]) -> DeviceResult<Option<String>> {
    Ok(Some(device.identity()))
}

fn scalar(device: &Device, _args: &[&str]) -> DeviceResult<Option<String>> {
    Ok(Some(format!("SCLR={}", device.scalar_reading())))
}

fn channel_count(device: &Device, _args: &[&str]) -> DeviceResult<Option<String>> {
    Ok(Some(device.channel_count().to_string()))
}

fn read(device: &Device, args: &[&str]) -> DeviceResult<Option<String>> {
    let id = device.parse_channel(args[0])?;
    Ok(Some(device.readback(id)?.to_string()))
}

fn set_setpoint(device: &Device, args: &[&str]) -> DeviceResult<Option<String>> {
    let id = device.parse_channel(args[0])?;
    let target: Real = parse_real(args[1], "set point")?;
    let stored = device.set_setpoint(id, target)?;
    Ok(Some(format!("SP{id}={stored}")))
}

fn ramp_rate(device: &Device, args: &[&str]) -> DeviceResult<Option<String>> {
    let id = device.parse_channel(args[0])?;
    Ok(Some(format!("RR{id}={}", device.live_ramp_rate(id)?)))
}

fn set_ramp_rate(device: &Device, args: &[&str]) -> DeviceResult<Option<String>> {
    let id = device.parse_channel(args[0])?;
    let rate = parse_real(args[1], "ramp rate")?;
    let stored = device.set_ramp_rate(id, rate)?;
    Ok(Some(format!("RR{id}={stored}")))
}

fn at_setpoint(device: &Device, args: &[&str]) -> DeviceResult<Option<String>> {
    let id = device.parse_channel(args[0])?;
    Ok(Some(flag(device.is_at_rest(id)?)))
}

fn stop(device: &Device, args: &[&str]) -> DeviceResult<Option<String>> {
    let id = device.parse_channel(args[0])?;
    Ok(Some(flag(device.stop(id)?)))
}

fn debug_level(device: &Device, args: &[&str]) -> DeviceResult<Option<String>> {
    let level = parse_uint(args[0], "log level")?;
    device.set_log_level(level)?;
    Ok(None)
}

fn gains(device: &Device, args: &[&str]) -> DeviceResult<Option<String>> {
    let id = device.parse_channel(args[0])?;
    Ok(Some(format_gains(device.gains(id)?)))
}

fn set_gains(device: &Device, args: &[&str]) -> DeviceResult<Option<String>> {
    let id = device.parse_channel(args[0])?;
    let gains = PidGains::new(
        parse_real(args[1], "P")?,
        parse_real(args[2], "I")?,
        parse_real(args[3], "D")?,
    )?;
    Ok(Some(format_gains(device.set_gains(id, gains)?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_arities() {
        let table = CommandTable::standard();
        let arity = |verb| table.lookup(verb).map(CommandSpec::arity);
        assert_eq!(arity("KILL"), Some(0));
        assert_eq!(arity("*IDN?"), Some(0));
        assert_eq!(arity("SCLR?"), Some(0));
        assert_eq!(arity("NCHAN?"), Some(0));
        assert_eq!(arity("READ?"), Some(1));
        assert_eq!(arity("SP"), Some(2));
        assert_eq!(arity("RR?"), Some(1));
        assert_eq!(arity("RR"), Some(2));
        assert_eq!(arity("ATSP?"), Some(1));
        assert_eq!(arity("STOP"), Some(1));
        assert_eq!(arity("DEBUG"), Some(1));
        assert_eq!(arity("PID?"), Some(1));
        assert_eq!(arity("SETPID"), Some(4));
    }

    #[test]
    fn verbs_are_unique_and_case_sensitive() {
        let table = CommandTable::standard();
        let mut verbs: Vec<_> = table.specs().iter().map(|s| s.verb).collect();
        verbs.sort_unstable();
        verbs.dedup();
        assert_eq!(verbs.len(), table.specs().len());
        assert!(table.lookup("read?").is_none());
        assert!(table.lookup("").is_none());
    }

    #[test]
    fn response_formatting() {
        assert_eq!(flag(true), "1");
        assert_eq!(flag(false), "0");
        assert_eq!(
            format_gains(PidGains::new(1.0, 0.5, 0.0).unwrap()),
            "P:1,I:0.5,D:0"
        );
    }
}
