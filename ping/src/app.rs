use std::io;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::{Duration, Instant};

use clap::{App, Arg};
use crossterm::style::Stylize;
use flexi_logger::FlexiLoggerError;
use log::debug;
use thiserror::Error;
use trust_dns_resolver::error::ResolveError;

use netping::icmp::{ChecksumPolicy, Code, Header, MessageType, Packet};
use netping::ip::Ipv4Header;
use netping::ping::{
    echo_payload, Echo, ECHO_IDENTIFIER, ECHO_PAYLOAD_SIZE, ECHO_SEQUENCE_NUMBER, REPLY_BUFFER_SIZE,
};
use netping::{Error, Transport};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(4);
const DEFAULT_TTL: u32 = 64;
const DEFAULT_CNT: u32 = 4;
const INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum AppError {
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
    #[error("no IPv4 address found for {0}")]
    NoIpv4Address(String),
    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Ping(#[from] Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("logger error: {0}")]
    Logger(#[from] FlexiLoggerError),
}
pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
struct Statistics {
    sent: u32,
    received: u32,
    total_time: Duration,
    max_time: Duration,
    min_time: Duration,
}

impl Statistics {
    fn new() -> Statistics {
        Statistics {
            sent: 0,
            received: 0,
            total_time: Duration::ZERO,
            max_time: Duration::ZERO,
            min_time: Duration::MAX,
        }
    }

    fn record(&mut self, rtt: Duration) {
        self.received += 1;
        self.total_time += rtt;
        self.max_time = self.max_time.max(rtt);
        self.min_time = self.min_time.min(rtt);
    }

    fn lost(&self) -> u32 {
        self.sent - self.received
    }

    fn loss_percentage(&self) -> f64 {
        if self.sent == 0 {
            return 0.0;
        }
        self.lost() as f64 / self.sent as f64 * 100.0
    }

    fn average(&self) -> Option<Duration> {
        if self.received == 0 {
            return None;
        }
        Some(self.total_time / self.received)
    }
}

pub struct PingApp {
    host: Option<String>,
    addr: IpAddr,
    timeout: Duration,
    ttl: u32,
    ident: u16,
    seq_cnt: u16,
    cnt: u32,
    policy: ChecksumPolicy,
    verbose: bool,
}

impl PingApp {
    pub fn from_args() -> AppResult<PingApp> {
        let matches = App::new("ping")
            .arg(
                Arg::new("REMOTE")
                    .takes_value(true)
                    .required(true)
                    .help("Remote ipv4 address or host name"),
            )
            .arg(
                Arg::new("TIMEOUT")
                    .takes_value(true)
                    .short('t')
                    .long("time-out")
                    .help("Set timeout (ms, us, ns or s; default 4s)"),
            )
            .arg(
                Arg::new("TTL")
                    .takes_value(true)
                    .short('l')
                    .long("ttl")
                    .help("Set the ttl value"),
            )
            .arg(
                Arg::new("ID")
                    .takes_value(true)
                    .short('i')
                    .long("id")
                    .help("Set the identifier field in ICMP header"),
            )
            .arg(
                Arg::new("SEQ")
                    .takes_value(true)
                    .short('s')
                    .long("seq")
                    .help("Set the first sequence num in ICMP header"),
            )
            .arg(
                Arg::new("CNT")
                    .takes_value(true)
                    .short('c')
                    .long("cnt")
                    .help("Set ping data packet count"),
            )
            .arg(
                Arg::new("STRICT")
                    .long("strict-checksum")
                    .help("Verify the checksum of echo replies too"),
            )
            .arg(
                Arg::new("VERBOSE")
                    .short('v')
                    .long("verbose")
                    .help("Log socket activity and print reply headers"),
            )
            .about("Ping a remote ipv4 host with ICMP echo requests.")
            .version("0.1.0")
            .get_matches();

        let host = matches
            .value_of("REMOTE")
            .ok_or(AppError::MissingArgument("REMOTE"))?;
        let (host, addr) = look_up_ip(host)?;

        let timeout = matches
            .value_of("TIMEOUT")
            .map(parse_timeout)
            .transpose()?
            .unwrap_or(DEFAULT_TIMEOUT);
        let ttl = parse_opt("TTL", matches.value_of("TTL"))?.unwrap_or(DEFAULT_TTL);
        let ident = parse_opt("ID", matches.value_of("ID"))?.unwrap_or(ECHO_IDENTIFIER);
        let seq_cnt = parse_opt("SEQ", matches.value_of("SEQ"))?.unwrap_or(ECHO_SEQUENCE_NUMBER);
        let cnt = parse_opt("CNT", matches.value_of("CNT"))?.unwrap_or(DEFAULT_CNT);
        if cnt == 0 {
            return Err(AppError::InvalidValue {
                name: "CNT",
                value: cnt.to_string(),
            });
        }

        let policy = if matches.is_present("STRICT") {
            ChecksumPolicy::Strict
        } else {
            ChecksumPolicy::TrustEchoReply
        };

        Ok(PingApp {
            host,
            addr,
            timeout,
            ttl,
            ident,
            seq_cnt,
            cnt,
            policy,
            verbose: matches.is_present("VERBOSE"),
        })
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn run(&self) -> AppResult<()> {
        let ip = format!("{}", self.addr).blue();
        let size = format!("{}", ECHO_PAYLOAD_SIZE).blue();

        match self.host {
            Some(ref host) => {
                let host = host.to_string().green();
                println!("ping {} [{}] with {} bytes of data: ", host, ip, size);
            }
            None => println!("ping {} with {} bytes of data: ", ip, size),
        }

        let transport = Transport::new()?.with_checksum_policy(self.policy);
        transport.set_ttl(self.ttl)?;
        transport.set_write_timeout(Some(self.timeout))?;

        let mut stats = Statistics::new();
        self.ping_all(&transport, &mut stats)?;
        self.print_statistics(&stats);
        Ok(())
    }

    fn request(&self, index: u32) -> Packet {
        Packet::create(
            MessageType::EchoRequest,
            Code::NoCode,
            self.ident,
            self.seq_cnt.wrapping_add(index as u16),
            echo_payload(),
        )
    }

    #[cfg(unix)]
    fn ping_all(&self, transport: &Transport, stats: &mut Statistics) -> AppResult<()> {
        use tokio_util::sync::CancellationToken;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        runtime.block_on(async {
            let shutdown = CancellationToken::new();
            let interrupt = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    interrupt.cancel();
                }
            });

            for index in 0..self.cnt {
                // Each request gets its own token so the timer only aborts
                // this receive; Ctrl-C cancels them all through the parent.
                let attempt = shutdown.child_token();
                let deadline = {
                    let attempt = attempt.clone();
                    let timeout = self.timeout;
                    tokio::spawn(async move {
                        tokio::time::sleep(timeout).await;
                        attempt.cancel();
                    })
                };

                let result = self.exchange_async(transport, &self.request(index), &attempt).await;
                deadline.abort();

                if shutdown.is_cancelled() {
                    println!("{}", "Interrupted".yellow());
                    break;
                }
                self.report(stats, result);

                if index + 1 < self.cnt {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(INTERVAL) => {}
                    }
                }
            }
        });
        Ok(())
    }

    /// Sends `request` and reads until its answer arrives, skipping our own
    /// looped-back requests and late replies to earlier requests.
    #[cfg(unix)]
    async fn exchange_async(
        &self,
        transport: &Transport,
        request: &Packet,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> netping::Result<Echo> {
        let timer = Instant::now();
        transport.send(request, self.addr)?;
        loop {
            let received = transport
                .receive_datagram_async(REPLY_BUFFER_SIZE, cancel)
                .await?;
            if answers(request, &received.packet) {
                return Ok(Echo {
                    rtt: timer.elapsed(),
                    reply: received.packet,
                    ttl: received.ttl,
                });
            }
            debug!("skipping unrelated {}", received.packet.header());
        }
    }

    #[cfg(not(unix))]
    fn ping_all(&self, transport: &Transport, stats: &mut Statistics) -> AppResult<()> {
        for index in 0..self.cnt {
            let result = self.exchange(transport, &self.request(index));
            self.report(stats, result);
            if index + 1 < self.cnt {
                std::thread::sleep(INTERVAL);
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn exchange(&self, transport: &Transport, request: &Packet) -> netping::Result<Echo> {
        let timer = Instant::now();
        transport.send(request, self.addr)?;
        loop {
            let remaining = self.timeout.saturating_sub(timer.elapsed());
            if remaining.is_zero() {
                return Err(io::Error::from(io::ErrorKind::TimedOut).into());
            }
            transport.set_read_timeout(Some(remaining))?;

            let received = transport.receive_datagram(REPLY_BUFFER_SIZE)?;
            if answers(request, &received.packet) {
                return Ok(Echo {
                    rtt: timer.elapsed(),
                    reply: received.packet,
                    ttl: received.ttl,
                });
            }
            debug!("skipping unrelated {}", received.packet.header());
        }
    }

    fn report(&self, stats: &mut Statistics, result: netping::Result<Echo>) {
        stats.sent += 1;
        let ip = format!("{}", self.addr).blue();

        let echo = match result {
            Ok(echo) => echo,
            Err(err) if is_timeout(&err) => {
                println!("{}", "Request timed out.".red());
                return;
            }
            Err(err) => {
                println!("Ping error: {}", err.to_string().red());
                return;
            }
        };

        let header = echo.reply.header();
        if self.verbose {
            println!("    {}", header);
        }
        if header.message_type() != MessageType::EchoReply {
            let kind = format!("{:?} ({:?})", header.message_type(), header.code()).red();
            println!("Reply from {}: {}", ip, kind);
            return;
        }

        stats.record(echo.rtt);
        let bytes = format!("{}", echo.reply.payload().len()).blue();
        let time = format!("{:?}", echo.rtt).green();
        let checksum = if echo.reply.is_valid() {
            String::new()
        } else {
            format!(" {}", "(bad checksum)".red())
        };
        match echo.ttl {
            Some(ttl) => println!(
                "Reply from {}: bytes={} time={} ttl={}{}",
                ip,
                bytes,
                time,
                format!("{}", ttl).yellow(),
                checksum
            ),
            None => println!("Reply from {}: bytes={} time={}{}", ip, bytes, time, checksum),
        }
    }

    fn print_statistics(&self, stats: &Statistics) {
        let ip = format!("{}", self.addr).blue();
        let total = format!("{}", stats.sent).blue();
        let recv = format!("{}", stats.received).green();
        let lost = format!("{}", stats.lost()).red();
        let lost_percentage = {
            let percentage = stats.loss_percentage();
            let percentage_str = format!("{:.0}", percentage);

            if percentage > 40.0 {
                percentage_str.red()
            } else if percentage > 20.0 {
                percentage_str.yellow()
            } else {
                percentage_str.green()
            }
        };

        println!("Ping statistics for {}: ", ip);
        println!(
            "    Packets: Sent = {}, Received = {}, Loss = {} ({}% loss)",
            total, recv, lost, lost_percentage
        );

        if let Some(avg_time) = stats.average() {
            let max_time = format!("{:#2?}", stats.max_time).green();
            let min_time = format!("{:#2?}", stats.min_time).green();
            let avg_time = format!("{:#2?}", avg_time).green();
            println!("Approximate round trip times: ");
            println!(
                "    Minimum = {}, Maximum = {}, Average = {}",
                min_time, max_time, avg_time
            );
        }
    }
}

/// Whether `reply` answers `request`: an echo reply carrying its identifier
/// and sequence number, or an error message quoting it.
fn answers(request: &Packet, reply: &Packet) -> bool {
    let request = request.header();
    let same_echo = |header: &Header| {
        header.identifier() == request.identifier()
            && header.sequence_number() == request.sequence_number()
    };

    match reply.header().message_type() {
        MessageType::EchoReply => same_echo(reply.header()),
        MessageType::DestinationUnreachable
        | MessageType::SourceQuench
        | MessageType::Redirect
        | MessageType::TimeExceeded
        | MessageType::ParameterProblem => {
            // Error messages carry the offending IP header and the first
            // 8 bytes of its payload.
            match Ipv4Header::decode(reply.payload()) {
                Ok((_, quoted)) => match Header::decode(quoted) {
                    Ok(quoted) => {
                        quoted.message_type() == MessageType::EchoRequest && same_echo(&quoted)
                    }
                    Err(_) => false,
                },
                Err(_) => false,
            }
        }
        _ => false,
    }
}

fn is_timeout(err: &Error) -> bool {
    match err {
        Error::Cancelled => true,
        Error::Transport { error } => matches!(
            error.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
        ),
        _ => false,
    }
}

fn parse_opt<T: FromStr>(name: &'static str, value: Option<&str>) -> AppResult<Option<T>> {
    value
        .map(|value| {
            value.trim().parse().map_err(|_| AppError::InvalidValue {
                name,
                value: value.to_string(),
            })
        })
        .transpose()
}

fn parse_timeout(timeout: &str) -> AppResult<Duration> {
    let invalid = || AppError::InvalidValue {
        name: "TIMEOUT",
        value: timeout.to_string(),
    };

    let mut num = String::new();
    let mut unit = String::new();

    for ch in timeout.trim().chars() {
        if ch.is_ascii_digit() || ch == '.' {
            num.push(ch);
        } else if ch.is_alphabetic() {
            unit.push(ch);
        }
    }

    let num: f64 = num.parse().map_err(|_| invalid())?;
    let nanos_per_unit = match unit.as_str() {
        "" | "ms" => 1e6,
        "s" => 1e9,
        "us" | "µs" => 1e3,
        "ns" => 1.0,
        _ => return Err(invalid()),
    };
    Ok(Duration::from_nanos((num * nanos_per_unit).round() as u64))
}

/// Literal addresses are used as is; names resolve to their first A record.
fn look_up_ip(host: &str) -> AppResult<(Option<String>, IpAddr)> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok((None, ip));
    }

    let resolver = trust_dns_resolver::Resolver::default()?;
    let lookup = resolver.lookup_ip(host)?;
    let ip = lookup
        .iter()
        .find(IpAddr::is_ipv4)
        .ok_or_else(|| AppError::NoIpv4Address(host.to_string()))?;
    Ok((Some(host.to_string()), ip))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_units() {
        assert_eq!(parse_timeout("250").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_timeout("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_timeout(" 2s ").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_timeout("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_timeout("500us").unwrap(), Duration::from_micros(500));
        assert_eq!(parse_timeout("1000ns").unwrap(), Duration::from_micros(1));
    }

    #[test]
    fn timeout_rejects_garbage() {
        assert!(matches!(parse_timeout("5h"), Err(AppError::InvalidValue { .. })));
        assert!(matches!(parse_timeout("ms"), Err(AppError::InvalidValue { .. })));
    }

    #[test]
    fn optional_values() {
        assert_eq!(parse_opt::<u16>("ID", Some("42")).unwrap(), Some(42));
        assert_eq!(parse_opt::<u16>("ID", None).unwrap(), None);
        assert!(matches!(
            parse_opt::<u16>("ID", Some("70000")),
            Err(AppError::InvalidValue { name: "ID", .. })
        ));
    }

    #[test]
    fn literal_address_skips_resolver() {
        let (host, ip) = look_up_ip("127.0.0.1").unwrap();
        assert_eq!(host, None);
        assert_eq!(ip, IpAddr::from([127, 0, 0, 1]));
    }

    #[test]
    fn statistics() {
        let mut stats = Statistics::new();
        assert_eq!(stats.average(), None);

        stats.sent = 4;
        stats.record(Duration::from_millis(10));
        stats.record(Duration::from_millis(30));
        assert_eq!(stats.lost(), 2);
        assert_eq!(stats.loss_percentage(), 50.0);
        assert_eq!(stats.min_time, Duration::from_millis(10));
        assert_eq!(stats.max_time, Duration::from_millis(30));
        assert_eq!(stats.average(), Some(Duration::from_millis(20)));
    }

    fn quoting(message_type: MessageType, code: Code, request: &Packet) -> Packet {
        let mut payload = vec![0u8; 20];
        payload[0] = 0x45;
        payload[9] = 1;
        payload.extend_from_slice(&request.to_bytes()[..8]);
        Packet::create(message_type, code, 0, 0, payload)
    }

    #[test]
    fn reply_matches_its_request() {
        let request = Packet::create(MessageType::EchoRequest, Code::NoCode, 7, 3, echo_payload());

        let reply = Packet::create(MessageType::EchoReply, Code::NoCode, 7, 3, echo_payload());
        assert!(answers(&request, &reply));

        let late = Packet::create(MessageType::EchoReply, Code::NoCode, 7, 2, echo_payload());
        assert!(!answers(&request, &late));

        let foreign = Packet::create(MessageType::EchoReply, Code::NoCode, 8, 3, echo_payload());
        assert!(!answers(&request, &foreign));

        // A raw socket also sees the request it just sent.
        assert!(!answers(&request, &request));
    }

    #[test]
    fn error_message_matches_quoted_request() {
        let request = Packet::create(MessageType::EchoRequest, Code::NoCode, 7, 3, echo_payload());
        let earlier = Packet::create(MessageType::EchoRequest, Code::NoCode, 7, 2, echo_payload());

        let unreachable = quoting(MessageType::DestinationUnreachable, Code::HostUnreachable, &request);
        assert!(answers(&request, &unreachable));

        let expired = quoting(MessageType::TimeExceeded, Code::TtlExceededInTransit, &earlier);
        assert!(!answers(&request, &expired));

        let truncated = Packet::create(MessageType::DestinationUnreachable, Code::HostUnreachable, 0, 0, vec![0x45; 12]);
        assert!(!answers(&request, &truncated));

        let timestamp = quoting(MessageType::Timestamp, Code::NoCode, &request);
        assert!(!answers(&request, &timestamp));
    }

    #[test]
    fn timeouts_are_recognized() {
        assert!(is_timeout(&Error::Cancelled));
        assert!(is_timeout(&Error::from(io::Error::from(io::ErrorKind::WouldBlock))));
        assert!(!is_timeout(&Error::from(io::Error::from(io::ErrorKind::PermissionDenied))));
        assert!(!is_timeout(&Error::ArgumentOutOfRange(u32::MAX)));
    }
}
