use clap::Parser;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use sd_controls::ControlMode;
use sd_device::{Device, DeviceConfig, DeviceError, DeviceResult, VerbosityControl};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "sd-cli")]
#[command(about = "Simulated multi-channel control device served over TCP", long_about = None)]
struct Args {
    /// Interface to bind (default 127.0.0.1)
    #[arg(short = 'i', long = "intf")]
    interface: Option<String>,

    /// TCP port to listen on (default 8888)
    #[arg(short, long)]
    port: Option<u16>,

    /// Number of channels (default 4)
    #[arg(short = 'n', long)]
    nchannels: Option<usize>,

    /// Model name reported by *IDN?
    #[arg(short, long)]
    model: Option<String>,

    /// Start logging at debug level
    #[arg(short, long)]
    debug: bool,

    /// YAML device configuration; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Drive channels with the PID-assisted ramp
    #[arg(long)]
    pid: bool,

    /// Serve without the interactive shell
    #[arg(long)]
    headless: bool,
}

impl Args {
    fn device_config(&self) -> DeviceResult<DeviceConfig> {
        let mut config = match &self.config {
            Some(path) => DeviceConfig::load(path)?,
            None => DeviceConfig::default(),
        };
        if let Some(interface) = &self.interface {
            config.connection.interface = interface.clone();
        }
        if let Some(port) = self.port {
            config.connection.port = port;
        }
        if let Some(nchannels) = self.nchannels {
            config.nchannels = nchannels;
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if self.pid {
            config.channel.mode = ControlMode::Pid;
        }
        Ok(config)
    }
}

/// `DEBUG` command backed by the installed subscriber's reload handle.
struct ReloadVerbosity(reload::Handle<LevelFilter, Registry>);

impl VerbosityControl for ReloadVerbosity {
    fn set_level(&self, level: LevelFilter) -> DeviceResult<()> {
        self.0.reload(level).map_err(|e| DeviceError::Verbosity {
            message: e.to_string(),
        })
    }
}

fn init_tracing(debug: bool) -> ReloadVerbosity {
    let initial = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let (filter, handle) = reload::Layer::new(initial);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
    ReloadVerbosity(handle)
}

/// Read commands from the terminal until the device dies or input ends.
fn run_shell(device: Arc<Device>) {
    let config = rustyline::Config::builder().auto_add_history(true).build();
    let mut rl = match DefaultEditor::with_config(config) {
        Ok(editor) => editor,
        Err(e) => {
            error!("Failed to create readline editor: {e}");
            return;
        }
    };

    while device.is_alive() {
        match rl.readline("> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                if let Some(output) = device.execute(&line) {
                    info!("{output}");
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                device.kill();
                break;
            }
            Err(e) => {
                error!("Readline error: {e}");
                device.kill();
                break;
            }
        }
    }
}

fn main() -> DeviceResult<()> {
    let args = Args::parse();
    let verbosity = init_tracing(args.debug);

    let config = args.device_config()?;
    let device = Device::with_verbosity(config, Box::new(verbosity))?;
    let addr = device.power_on()?;
    info!(%addr, model = device.model(), "device powered on");

    if !args.headless {
        let shell_device = Arc::clone(&device);
        thread::Builder::new()
            .name("sd-shell".to_string())
            .spawn(move || run_shell(shell_device))?;
    }

    device.wait();
    device.kill();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_flags() {
        let args = Args::try_parse_from(["sd-cli"]).unwrap();
        let config = args.device_config().unwrap();
        assert_eq!(config.connection.interface, "127.0.0.1");
        assert_eq!(config.connection.port, 8888);
        assert_eq!(config.nchannels, 4);
        assert_eq!(config.model, "EPICS Trainer");
        assert_eq!(config.channel.mode, ControlMode::Ramp);
        assert!(!args.debug);
        assert!(!args.headless);
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from([
            "sd-cli", "-i", "0.0.0.0", "-p", "9000", "-n", "2", "-m", "Cryostat", "-d", "--pid",
            "--headless",
        ])
        .unwrap();
        let config = args.device_config().unwrap();
        assert_eq!(config.connection.interface, "0.0.0.0");
        assert_eq!(config.connection.port, 9000);
        assert_eq!(config.nchannels, 2);
        assert_eq!(config.model, "Cryostat");
        assert_eq!(config.channel.mode, ControlMode::Pid);
        assert!(args.debug);
        assert!(args.headless);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let args =
            Args::try_parse_from(["sd-cli", "-c", "/nonexistent/sd-device.yaml"]).unwrap();
        assert!(matches!(args.device_config(), Err(DeviceError::Io(_))));
    }
}
