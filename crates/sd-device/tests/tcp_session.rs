use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use sd_device::{ConnectionConfig, Device, DeviceConfig};

fn test_device(nchannels: usize) -> (Arc<Device>, SocketAddr) {
    let config = DeviceConfig {
        nchannels,
        poll_interval_ms: 2,
        scalar_noise_level: 0.0,
        connection: ConnectionConfig {
            port: 0,
            timeout_ms: 50,
            ..ConnectionConfig::default()
        },
        ..DeviceConfig::default()
    };
    let device = Device::new(config).unwrap();
    let addr = device.power_on().unwrap();
    (device, addr)
}

struct Client {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Client {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        Self { stream, reader }
    }

    fn send(&mut self, command: &str) {
        self.stream
            .write_all(format!("{command}\n").as_bytes())
            .unwrap();
    }

    fn query(&mut self, command: &str) -> String {
        self.send(command);
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        line.trim_end_matches('\n').to_string()
    }

    fn query_until(&mut self, command: &str, expected: &str) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if self.query(command) == expected {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }
}

#[test]
fn setpoint_round_trip_over_tcp() {
    let (device, addr) = test_device(4);
    let mut client = Client::connect(addr);

    assert_eq!(client.query("NCHAN?"), "4");
    assert_eq!(client.query("RR 1 20"), "RR1=20");
    assert_eq!(client.query("SP 1 50"), "SP1=50");
    assert!(client.query_until("ATSP? 1", "1"));
    assert_eq!(client.query("READ? 1"), "50");

    device.kill();
    device.wait();
}

#[test]
fn bad_commands_do_not_disrupt_the_session() {
    let (device, addr) = test_device(2);
    let mut client = Client::connect(addr);

    // None of these produce a reply; the next query's answer must be its own.
    client.send("BOGUS");
    client.send("SP 1");
    client.send("READ? 9");
    client.send("");
    assert_eq!(client.query("NCHAN?"), "2");
    assert_eq!(client.query("PID? 2"), "P:1,I:0,D:0");

    device.kill();
    device.wait();
}

#[test]
fn pipelined_commands_are_answered_in_order() {
    let (device, addr) = test_device(1);
    let mut client = Client::connect(addr);

    client
        .stream
        .write_all(b"SP 1 -5\nRR 1 2\nNCHAN?\n")
        .unwrap();
    let mut replies = Vec::new();
    for _ in 0..3 {
        let mut line = String::new();
        client.reader.read_line(&mut line).unwrap();
        replies.push(line);
    }
    assert_eq!(replies, vec!["SP1=-5\n", "RR1=2\n", "1\n"]);

    device.kill();
    device.wait();
}

#[test]
fn reconnect_after_client_drops() {
    let (device, addr) = test_device(1);

    {
        let mut client = Client::connect(addr);
        assert_eq!(client.query("SP 1 3"), "SP1=3");
    }

    let mut client = Client::connect(addr);
    assert_eq!(client.query("NCHAN?"), "1");
    assert!(client.query_until("READ? 1", "3"));

    device.kill();
    device.wait();
}

#[test]
fn reconnect_after_reset_mid_command() {
    let (device, addr) = test_device(2);

    {
        let mut client = Client::connect(addr);
        assert_eq!(client.query("NCHAN?"), "2");
        // Replies are never read and the last command is cut off, so the
        // close resets the connection instead of ending it cleanly.
        let mut burst = "NCHAN?\n".repeat(200);
        burst.push_str("SP 1 ");
        client.stream.write_all(burst.as_bytes()).unwrap();
    }

    let mut client = Client::connect(addr);
    assert_eq!(client.query("NCHAN?"), "2");
    assert_eq!(client.query("SP 1 4"), "SP1=4");
    assert!(client.query_until("READ? 1", "4"));

    device.kill();
    device.wait();
}

#[test]
fn kill_over_the_wire_ends_the_connection_loop() {
    let (device, addr) = test_device(2);
    let mut client = Client::connect(addr);

    assert_eq!(client.query("NCHAN?"), "2");
    client.send("KILL");

    let started = Instant::now();
    device.wait();
    assert!(!device.is_alive());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn dropping_the_last_handle_shuts_down() {
    let (device, addr) = test_device(1);
    let mut client = Client::connect(addr);
    assert_eq!(client.query("NCHAN?"), "1");

    drop(device);

    // The session notices within one read timeout and closes the socket.
    let mut line = String::new();
    assert_eq!(client.reader.read_line(&mut line).unwrap(), 0);
}

#[test]
fn second_power_on_is_refused() {
    let (device, addr) = test_device(1);
    assert_eq!(device.local_addr(), Some(addr));
    assert!(device.power_on().is_err());
    device.kill();
    device.wait();
}
