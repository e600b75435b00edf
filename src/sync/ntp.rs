// ABOUTME: Minimal SNTP client for offset measurement
// ABOUTME: NTPv4 client-mode packets over UDP, timestamp conversion, and response validation

use crate::error::Error;
use crate::timecode::WallClockSample;
use crate::MICROS_PER_SECOND;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

/// Well-known NTP port.
pub const NTP_PORT: u16 = 123;

/// Seconds from 1900-01-01 (NTP era 0) to 1970-01-01.
pub const NTP_UNIX_EPOCH_DELTA: i64 = 2_208_988_800;

/// Length of one NTP era (2^32 seconds) in microseconds.
const NTP_ERA_MICROS: i64 = (1 << 32) * MICROS_PER_SECOND;

/// Size of an NTP header without extensions.
pub const NTP_PACKET_LEN: usize = 48;

/// LI = 0, VN = 4, Mode = 3 (client).
const CLIENT_LI_VN_MODE: u8 = 0x23;

const MODE_SERVER: u8 = 4;
const MODE_BROADCAST: u8 = 5;
const LEAP_UNSYNCHRONIZED: u8 = 3;

/// 64-bit NTP timestamp: seconds since 1900 and a 32-bit binary fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NtpTimestamp {
    pub seconds: u32,
    pub fraction: u32,
}

impl NtpTimestamp {
    /// Timestamp for Unix microseconds.
    pub fn from_unix_micros(unix_micros: i64) -> Self {
        let secs = unix_micros.div_euclid(MICROS_PER_SECOND);
        let micros = unix_micros.rem_euclid(MICROS_PER_SECOND) as u64;
        Self {
            seconds: (secs + NTP_UNIX_EPOCH_DELTA) as u32,
            fraction: ((micros << 32) / MICROS_PER_SECOND as u64) as u32,
        }
    }

    /// Unix microseconds for this timestamp (era 0).
    pub fn to_unix_micros(&self) -> i64 {
        let unix_secs = self.seconds as i64 - NTP_UNIX_EPOCH_DELTA;
        let micros = ((self.fraction as i64) * MICROS_PER_SECOND) >> 32;
        unix_secs * MICROS_PER_SECOND + micros
    }

    /// Unix microseconds in the NTP era closest to `reference_us`.
    ///
    /// The seconds field wraps every 2^32 s (first in February 2036); the
    /// local clock picks the era.
    pub fn to_unix_micros_near(&self, reference_us: i64) -> i64 {
        let era0 = self.to_unix_micros();
        let eras = (reference_us - era0 + NTP_ERA_MICROS / 2).div_euclid(NTP_ERA_MICROS);
        era0 + eras * NTP_ERA_MICROS
    }

    fn read(bytes: &[u8]) -> Self {
        Self {
            seconds: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            fraction: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }

    fn write(&self, bytes: &mut [u8]) {
        bytes[..4].copy_from_slice(&self.seconds.to_be_bytes());
        bytes[4..8].copy_from_slice(&self.fraction.to_be_bytes());
    }
}

/// The fields of a server response the synchronizer cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NtpResponse {
    pub leap: u8,
    pub version: u8,
    pub mode: u8,
    pub stratum: u8,
    pub origin: NtpTimestamp,
    pub receive: NtpTimestamp,
    pub transmit: NtpTimestamp,
}

/// Client request carrying our transmit timestamp.
pub fn encode_request(transmit: NtpTimestamp) -> [u8; NTP_PACKET_LEN] {
    let mut packet = [0u8; NTP_PACKET_LEN];
    packet[0] = CLIENT_LI_VN_MODE;
    transmit.write(&mut packet[40..48]);
    packet
}

/// Parse and validate a server response.
///
/// Rejects short packets, non-server modes, kiss-o'-death (stratum 0), and
/// servers that advertise themselves as unsynchronized.
pub fn decode_response(bytes: &[u8]) -> Result<NtpResponse, Error> {
    if bytes.len() < NTP_PACKET_LEN {
        return Err(Error::Protocol(format!(
            "short packet: {} bytes",
            bytes.len()
        )));
    }
    let response = NtpResponse {
        leap: bytes[0] >> 6,
        version: (bytes[0] >> 3) & 0x07,
        mode: bytes[0] & 0x07,
        stratum: bytes[1],
        origin: NtpTimestamp::read(&bytes[24..32]),
        receive: NtpTimestamp::read(&bytes[32..40]),
        transmit: NtpTimestamp::read(&bytes[40..48]),
    };

    if response.mode != MODE_SERVER && response.mode != MODE_BROADCAST {
        return Err(Error::Protocol(format!("unexpected mode {}", response.mode)));
    }
    if response.stratum == 0 {
        return Err(Error::Protocol("kiss-o'-death (stratum 0)".to_string()));
    }
    if response.leap == LEAP_UNSYNCHRONIZED {
        return Err(Error::Protocol("server clock unsynchronized".to_string()));
    }
    Ok(response)
}

/// Anything that can measure `remote - local` in microseconds with one round trip.
pub trait TimeSource {
    fn measure(&mut self) -> Result<i64, Error>;
}

/// UDP client bound to one resolved server.
pub struct NtpClient {
    socket: UdpSocket,
    server: SocketAddr,
    timeout: Duration,
}

impl NtpClient {
    /// Resolve `host:port` (IPv4 preferred) and open a socket with `timeout`
    /// applied to receives.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, Error> {
        let server = resolve(host, port)?;
        let bind_addr: SocketAddr = if server.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_read_timeout(Some(timeout))?;
        socket.connect(server)?;
        Ok(Self {
            socket,
            server,
            timeout,
        })
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }
}

impl TimeSource for NtpClient {
    /// One exchange: `server transmit - local receive`.
    ///
    /// Replies whose origin timestamp does not echo this request's transmit
    /// timestamp (late answers to an earlier query, unsolicited packets) are
    /// skipped until the timeout runs out.
    fn measure(&mut self) -> Result<i64, Error> {
        let sent = NtpTimestamp::from_unix_micros(WallClockSample::now().unix_micros());
        let request = encode_request(sent);
        self.socket.send(&request)?;

        let deadline = Instant::now() + self.timeout;
        let mut buf = [0u8; 128];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Protocol("no reply matching the request".to_string()));
            }
            self.socket.set_read_timeout(Some(remaining))?;
            let len = self.socket.recv(&mut buf)?;
            let received_us = WallClockSample::now().unix_micros();

            let response = decode_response(&buf[..len])?;
            if response.origin != sent {
                log::debug!("Ignoring NTP reply with foreign origin {:?}", response.origin);
                continue;
            }
            return Ok(response.transmit.to_unix_micros_near(received_us) - received_us);
        }
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, Error> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|_| Error::Resolve(host.to_string()))?
        .collect();
    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| Error::Resolve(host.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_packet(li_vn_mode: u8, stratum: u8, transmit: NtpTimestamp) -> [u8; NTP_PACKET_LEN] {
        let mut packet = [0u8; NTP_PACKET_LEN];
        packet[0] = li_vn_mode;
        packet[1] = stratum;
        transmit.write(&mut packet[40..48]);
        packet
    }

    #[test]
    fn test_epoch_conversion() {
        let ts = NtpTimestamp::from_unix_micros(0);
        assert_eq!(ts.seconds as i64, NTP_UNIX_EPOCH_DELTA);
        assert_eq!(ts.fraction, 0);
        assert_eq!(ts.to_unix_micros(), 0);
    }

    #[test]
    fn test_half_second_fraction() {
        let ts = NtpTimestamp::from_unix_micros(1_500_000);
        assert_eq!(ts.fraction, 1 << 31);
        assert_eq!(ts.to_unix_micros(), 1_500_000);
    }

    #[test]
    fn test_fraction_truncates_to_micros() {
        let ts = NtpTimestamp {
            seconds: NTP_UNIX_EPOCH_DELTA as u32 + 10,
            fraction: u32::MAX,
        };
        assert_eq!(ts.to_unix_micros(), 10_999_999);
    }

    #[test]
    fn test_request_layout() {
        let ts = NtpTimestamp {
            seconds: 0x0102_0304,
            fraction: 0x0506_0708,
        };
        let packet = encode_request(ts);
        assert_eq!(packet[0], 0x23);
        assert_eq!(&packet[40..48], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(packet[1..40].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_decode_server_response() {
        let transmit = NtpTimestamp::from_unix_micros(1_700_000_000_250_000);
        // LI 0, VN 4, mode 4
        let packet = server_packet(0x24, 2, transmit);
        let response = decode_response(&packet).unwrap();
        assert_eq!(response.mode, 4);
        assert_eq!(response.version, 4);
        assert_eq!(response.stratum, 2);
        assert_eq!(response.transmit.to_unix_micros(), 1_700_000_000_250_000);
    }

    #[test]
    fn test_decode_rejects_bad_responses() {
        let ts = NtpTimestamp::from_unix_micros(1_000_000);
        assert!(decode_response(&[0u8; 20]).is_err());
        // client mode echoed back
        assert!(decode_response(&server_packet(0x23, 2, ts)).is_err());
        // kiss-o'-death
        assert!(decode_response(&server_packet(0x24, 0, ts)).is_err());
        // LI = 3
        assert!(decode_response(&server_packet(0xE4, 2, ts)).is_err());
    }

    #[test]
    fn test_era_follows_reference_clock() {
        // 2040-01-01T00:00:00Z, after the era 0 seconds counter wraps.
        let unix_us = 2_208_988_800_000_000;
        let ts = NtpTimestamp::from_unix_micros(unix_us);
        assert!((ts.seconds as i64) < NTP_UNIX_EPOCH_DELTA);
        assert_ne!(ts.to_unix_micros(), unix_us);
        assert_eq!(ts.to_unix_micros_near(unix_us + 3_000_000), unix_us);

        let before_wrap = NtpTimestamp::from_unix_micros(1_700_000_000_250_000);
        assert_eq!(
            before_wrap.to_unix_micros_near(1_700_000_000_000_000),
            1_700_000_000_250_000
        );
    }

    /// Answers each request with a stale reply first, then the matching one.
    fn spawn_server(lead_us: i64, stale_first: bool, matching: bool) -> u16 {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let port = socket.local_addr().unwrap().port();

        std::thread::spawn(move || {
            let mut buf = [0u8; 128];
            let Ok((_, peer)) = socket.recv_from(&mut buf) else {
                return;
            };
            let now = WallClockSample::now().unix_micros();
            if stale_first {
                let mut stale = server_packet(0x24, 2, NtpTimestamp::from_unix_micros(now + 7_000_000));
                NtpTimestamp::from_unix_micros(now - 1_000_000).write(&mut stale[24..32]);
                socket.send_to(&stale, peer).unwrap();
            }
            if matching {
                let mut reply = server_packet(0x24, 2, NtpTimestamp::from_unix_micros(now + lead_us));
                reply[24..32].copy_from_slice(&buf[40..48]);
                socket.send_to(&reply, peer).unwrap();
            }
        });
        port
    }

    #[test]
    fn test_measure_skips_reply_to_other_request() {
        let port = spawn_server(200_000, true, true);
        let mut client = NtpClient::connect("127.0.0.1", port, Duration::from_secs(1)).unwrap();
        let offset = client.measure().unwrap();
        assert!((offset - 200_000).abs() < 50_000, "offset {offset}");
    }

    #[test]
    fn test_measure_rejects_unmatched_reply() {
        let port = spawn_server(0, true, false);
        let mut client = NtpClient::connect("127.0.0.1", port, Duration::from_millis(200)).unwrap();
        assert!(client.measure().is_err());
    }

    #[test]
    fn test_resolve_failure() {
        let err = resolve("no-such-host.invalid", NTP_PORT).unwrap_err();
        assert!(matches!(err, Error::Resolve(_)));
    }
}
