//! The network client driving an ESP-AT coprocessor that answers the way the
//! real firmware does.

use std::collections::VecDeque;

use laelaps::{
    command::Dispatcher,
    config::NetConfig,
    lines::LineRing,
    net::{esp_at::EspAt, esp_at::Link, Client, Phase, Step},
    rb::{Consumer, Ringbuf},
    store::PositionStore,
    Position,
};

#[derive(Default)]
struct Coprocessor {
    refuse: bool,
    to_mcu: VecDeque<u8>,
    line: Vec<u8>,
    payload_left: usize,
    payload_len: usize,
    /// Bytes the ground station received.
    delivered: Vec<u8>,
    commands: Vec<String>,
}

impl Coprocessor {
    fn say(&mut self, bytes: &[u8]) {
        self.to_mcu.extend(bytes);
    }

    fn station_sends(&mut self, data: &[u8]) {
        self.say(format!("\r\n+IPD,{}:", data.len()).as_bytes());
        self.say(data);
    }

    fn command(&mut self, line: &str) {
        self.commands.push(line.to_string());
        // Echo is on
        self.say(format!("{line}\r\r\n").as_bytes());

        if line.starts_with("AT+CIPSTART=") {
            if self.refuse {
                self.say(b"ERROR\r\nCLOSED\r\n");
            } else {
                self.say(b"CONNECT\r\n\r\nOK\r\n");
            }
        } else if let Some(len) = line.strip_prefix("AT+CIPSEND=") {
            self.payload_len = len.parse().unwrap();
            self.payload_left = self.payload_len;
            self.say(b"\r\nOK\r\n> ");
        } else if line == "AT+CIPCLOSE" {
            self.say(b"CLOSED\r\n\r\nOK\r\n");
        } else {
            self.say(b"\r\nERROR\r\n");
        }
    }
}

impl Link for Coprocessor {
    fn read(&mut self) -> Option<u8> {
        self.to_mcu.pop_front()
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if self.payload_left > 0 {
                self.delivered.push(b);
                self.payload_left -= 1;
                if self.payload_left == 0 {
                    let ack = format!("\r\nRecv {} bytes\r\n\r\nSEND OK\r\n", self.payload_len);
                    self.say(ack.as_bytes());
                }
                continue;
            }

            self.line.push(b);
            if b == b'\n' {
                let line = String::from_utf8(std::mem::take(&mut self.line)).unwrap();
                self.command(line.trim_end());
            }
        }
    }
}

fn step_until(
    client: &mut Client<EspAt<Coprocessor>>,
    now: &mut u64,
    end: u64,
    inbound: &LineRing<5, 64>,
    outbox: &Consumer<u8, 64>,
) {
    while *now < end {
        match client.step(*now, inbound, outbox) {
            Step::Sleep(d) => *now += (d.as_millis() as u64).max(1),
            Step::Halted(err) => panic!("halted: {err}"),
        }
    }
}

#[test]
fn full_session_against_the_coprocessor() {
    static OUTBOX: Ringbuf<u8, 64> = Ringbuf::new(None);
    let (mut outbox_tx, outbox_rx) = OUTBOX.try_split().unwrap();
    let inbound = LineRing::<5, 64>::new();
    let store = PositionStore::new();
    let dispatcher = Dispatcher::new(2);

    let mut client = Client::new(EspAt::new(Coprocessor::default()), NetConfig::DEFAULT);
    let mut now = 0;
    step_until(&mut client, &mut now, 1_100, &inbound, &outbox_rx);
    assert!(client.is_connected());
    assert_eq!(
        client.transport().link().commands,
        ["AT+CIPSTART=\"TCP\",\"192.168.4.1\",7983"]
    );

    client
        .transport_mut()
        .link_mut()
        .station_sends(b"$id-req\n$gps-dest:35.78,-78.64\n");
    step_until(&mut client, &mut now, 1_200, &inbound, &outbox_rx);
    assert_eq!(dispatcher.poll(&inbound, &store, &mut outbox_tx), 2);
    assert_eq!(store.read_target(), Position { lat: 35.78, lon: -78.64 });

    step_until(&mut client, &mut now, 1_300, &inbound, &outbox_rx);
    let link = client.transport().link();
    assert_eq!(link.delivered, b"$id-ack-2\r\n");
    assert_eq!(link.commands[1], "AT+CIPSEND=11");
    assert!(client.stats().last_send_error.is_none());
}

#[test]
fn station_hang_up_reconnects() {
    static OUTBOX: Ringbuf<u8, 64> = Ringbuf::new(None);
    let (_outbox_tx, outbox_rx) = OUTBOX.try_split().unwrap();
    let inbound = LineRing::<5, 64>::new();

    let mut client = Client::new(EspAt::new(Coprocessor::default()), NetConfig::DEFAULT);
    let mut now = 0;
    step_until(&mut client, &mut now, 1_100, &inbound, &outbox_rx);
    assert!(client.is_connected());

    client.transport_mut().link_mut().say(b"\r\nCLOSED\r\n");
    step_until(&mut client, &mut now, 1_200, &inbound, &outbox_rx);
    assert_eq!(client.phase(), Phase::Backoff);
    assert_eq!(client.transport().link().commands.last().unwrap(), "AT+CIPCLOSE");

    step_until(&mut client, &mut now, 2_300, &inbound, &outbox_rx);
    assert!(client.is_connected());
    assert_eq!(client.stats().connections, 2);
}

#[test]
fn refusing_station_is_retried_each_second() {
    static OUTBOX: Ringbuf<u8, 64> = Ringbuf::new(None);
    let (_outbox_tx, outbox_rx) = OUTBOX.try_split().unwrap();
    let inbound = LineRing::<5, 64>::new();

    let coprocessor = Coprocessor {
        refuse: true,
        ..Default::default()
    };
    let mut client = Client::new(EspAt::new(coprocessor), NetConfig::DEFAULT);
    let mut now = 0;
    step_until(&mut client, &mut now, 5_500, &inbound, &outbox_rx);

    let starts = client
        .transport()
        .link()
        .commands
        .iter()
        .filter(|c| c.starts_with("AT+CIPSTART"))
        .count();
    assert_eq!(starts, 5);
    assert_eq!(client.stats().failures, 5);
    assert!(!client.is_connected());
}
