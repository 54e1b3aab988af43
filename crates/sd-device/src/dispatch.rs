//! Turns a received line into a handler call.
//!
//! [`Dispatcher::dispatch`] reports exactly why a line produced no output;
//! [`Dispatcher::execute`] logs that reason and swallows it, which is what the
//! connection loop and the shell want.

use tracing::{debug, error};

use crate::command::CommandTable;
use crate::device::Device;
use crate::error::{DeviceError, DeviceResult};

/// Split a command line into verb and argument tokens.
pub fn tokenize(line: &str) -> Vec<&str> {
    line.split_whitespace().collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Dispatcher {
    table: CommandTable,
}

impl Dispatcher {
    pub fn new(table: CommandTable) -> Self {
        Self { table }
    }

    /// Run one tokenized command against `device`.
    ///
    /// A blank line is `Ok(None)`. Unknown verbs and wrong argument counts are
    /// protocol errors; anything a handler returns is wrapped in
    /// [`DeviceError::CommandFailed`].
    pub fn dispatch(&self, device: &Device, tokens: &[&str]) -> DeviceResult<Option<String>> {
        let Some((verb, args)) = tokens.split_first() else {
            return Ok(None);
        };

        let spec = self
            .table
            .lookup(verb)
            .ok_or_else(|| DeviceError::UnsupportedCommand {
                verb: verb.to_string(),
            })?;

        if args.len() != spec.arity() {
            return Err(DeviceError::ArgumentCount {
                verb: spec.verb,
                expected: spec.arity(),
                params: spec.params.join(", "),
                got: args.len(),
            });
        }

        (spec.handler)(device, args).map_err(|e| DeviceError::CommandFailed {
            verb: spec.verb,
            source: Box::new(e),
        })
    }

    /// Run one raw line, logging instead of returning failures.
    pub fn execute(&self, device: &Device, line: &str) -> Option<String> {
        let tokens = tokenize(line);
        match self.dispatch(device, &tokens) {
            Ok(Some(output)) => {
                debug!(%output, "command output");
                Some(output)
            }
            Ok(None) => None,
            Err(e) => {
                error!("{e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_collapses_whitespace() {
        assert_eq!(tokenize("SP 1 50"), vec!["SP", "1", "50"]);
        assert_eq!(tokenize("  SP\t1   50 \r"), vec!["SP", "1", "50"]);
        assert_eq!(tokenize("NCHAN? "), vec!["NCHAN?"]);
        assert!(tokenize("   ").is_empty());
    }
}
