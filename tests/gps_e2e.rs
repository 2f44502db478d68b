mod common;

use common::{close_to, GGA};
use laelaps::{
    config::GPS_WINDOW_LEN,
    gps::{self, Fix, UtcTime, Window},
    rb::Ringbuf,
    store::PositionStore,
};

#[test]
fn receiver_stream_updates_the_fix() {
    static GPS_RX: Ringbuf<u8, 1024> = Ringbuf::new(None);
    let (uart, rx) = GPS_RX.try_split().unwrap();
    let store = PositionStore::new();
    let mut window = [0_u8; GPS_WINDOW_LEN];

    // One receiver burst, as the UART interrupt would queue it
    for sentence in [
        &b"$GPGSV,3,1,11,03,03,111,00,04,15,270,00,06,01,010,00,13,06,292,00*74\r\n"[..],
        b"$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A\r\n",
        GGA,
        b"$GPGSA,A,3,04,05,,09,12,,,24,,,,,2.5,1.3,2.1*39\r\n",
    ] {
        uart.try_write_all(sentence).unwrap();
    }

    let n = rx.read_available(&mut window);
    let fix = gps::ingest(&window[..n], &store).unwrap();

    let read = store.read_fix();
    assert_eq!(read, fix);
    assert_eq!(read.utc, UtcTime { hour: 12, minute: 35, second: 19 });
    assert!(close_to(read.position.lat, 48.1173));
    assert!(close_to(read.position.lon, 11.516_667));
    assert_eq!(read.satellites, 8);
    assert_eq!(read.hdop, 0.9);
    assert_eq!(read.altitude, 545.4);
}

#[test]
fn sentence_cut_by_the_window_keeps_the_previous_fix() {
    let store = PositionStore::new();
    let first = gps::ingest(GGA, &store).unwrap();

    let later = b"$GPGGA,123520,4807.040,S,01131.002,W,1,09,1.0,546.0,M,46.9,M,,*47\r\n";
    let (head, tail) = later.split_at(30);

    assert!(gps::ingest(head, &store).is_none());
    assert_eq!(store.read_fix(), first);

    // The tail alone has no marker
    assert!(gps::ingest(tail, &store).is_none());
    assert_eq!(store.read_fix(), first);

    let fix = gps::ingest(later, &store).unwrap();
    assert!(fix.position.lat < 0.0 && fix.position.lon < 0.0);
    assert_eq!(store.read_fix().satellites, 9);
}

#[test]
fn sentence_split_across_reads_is_reassembled() {
    static GPS_RX: Ringbuf<u8, 1024> = Ringbuf::new(None);
    let (uart, rx) = GPS_RX.try_split().unwrap();
    let store = PositionStore::new();
    let mut window = Window::<GPS_WINDOW_LEN>::new();

    let (head, tail) = GGA.split_at(30);
    uart.try_write_all(b"$GPGSA,A,3,04,05,,09,12,,,24,,,,,2.5,1.3,2.1*39\r\n").unwrap();
    uart.try_write_all(head).unwrap();
    assert!(window.ingest_from(&rx, &store).is_none());
    assert_eq!(window.carried(), head);

    uart.try_write_all(tail).unwrap();
    let fix = window.ingest_from(&rx, &store).unwrap();
    assert_eq!(store.read_fix(), fix);
    assert_eq!(fix.satellites, 8);
    assert!(window.carried().is_empty());
}

#[test]
fn noise_never_commits() {
    let store = PositionStore::new();
    let noise: Vec<u8> = (0..2048_u32).map(|i| (i * 97 % 256) as u8).collect();
    for chunk in noise.chunks(GPS_WINDOW_LEN) {
        let _ = gps::ingest(chunk, &store);
    }
    assert_eq!(store.read_fix(), Fix::ZERO);
}
