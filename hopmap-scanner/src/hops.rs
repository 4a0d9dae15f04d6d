// Hop extraction from raw traceroute output

use regex::Regex;
use std::net::Ipv4Addr;
use std::sync::LazyLock;
use tracing::{debug, info};

static IPV4_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b").expect("IPv4 pattern is valid")
});

/// Parse raw traceroute output into an ordered list of hop addresses.
///
/// Each line contributes at most one hop: the first IPv4 literal found on it.
/// Blank lines, the command's own banner and lines without an address (timed
/// out probes) are skipped, so the returned positions are dense rather than
/// tracking the input line numbers. An empty result means "no path found".
pub fn parse_hops(output: &str) -> Vec<Ipv4Addr> {
    let mut hops = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() || is_banner(line) {
            continue;
        }

        let Some(found) = IPV4_PATTERN.find(line) else {
            continue;
        };

        match found.as_str().parse::<Ipv4Addr>() {
            Ok(addr) if is_valid_hop(addr) => hops.push(addr),
            Ok(addr) => debug!("Discarding reserved hop address {}", addr),
            Err(_) => debug!("Discarding malformed hop address {}", found.as_str()),
        }
    }

    info!("Parsed {} valid hops from traceroute output", hops.len());
    hops
}

/// Loopback, the unspecified placeholder and the 255/8 broadcast range never
/// count as hops. Private ranges are kept.
pub fn is_valid_hop(addr: Ipv4Addr) -> bool {
    !(addr.is_loopback() || addr.is_unspecified() || addr.octets()[0] == 255)
}

fn is_banner(line: &str) -> bool {
    let lower = line.to_lowercase();
    lower.contains("traceroute") || lower.contains("tracing route")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(list: &[&str]) -> Vec<Ipv4Addr> {
        list.iter().map(|a| a.parse().unwrap()).collect()
    }

    #[test]
    fn test_parse_simple_chain() {
        let hops = parse_hops("1  10.0.0.1\n2  8.8.8.8\n3  1.1.1.1");
        assert_eq!(hops, addrs(&["10.0.0.1", "8.8.8.8", "1.1.1.1"]));
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_hops("").is_empty());
        assert!(parse_hops("\n\n   \n").is_empty());
    }

    #[test]
    fn test_skips_banner_lines() {
        let output = "traceroute to 1.1.1.1 (1.1.1.1), 38 hops max, 60 byte packets\n\
                      1  192.168.1.1 (192.168.1.1)  0.512 ms  0.498 ms  0.470 ms\n\
                      2  1.1.1.1 (1.1.1.1)  9.120 ms  9.001 ms  8.870 ms";
        assert_eq!(parse_hops(output), addrs(&["192.168.1.1", "1.1.1.1"]));
    }

    #[test]
    fn test_skips_windows_banner() {
        let output = "Tracing route to one.one.one.one [1.1.1.1]\n\
                      over a maximum of 30 hops:\n\
                      \n\
                        1    <1 ms    <1 ms    <1 ms  192.168.0.1\n\
                        2     9 ms     8 ms     9 ms  1.1.1.1\n\
                      \n\
                      Trace complete.";
        assert_eq!(parse_hops(output), addrs(&["192.168.0.1", "1.1.1.1"]));
    }

    #[test]
    fn test_timeouts_do_not_leave_gaps() {
        let output = "1  10.0.0.1  1.0 ms\n2  * * *\n3  * * *\n4  9.9.9.9  12.0 ms";
        assert_eq!(parse_hops(output), addrs(&["10.0.0.1", "9.9.9.9"]));
    }

    #[test]
    fn test_takes_first_address_on_line() {
        let output = " 1  gw.example.net (203.0.113.1)  1.1 ms 203.0.113.9  1.3 ms";
        assert_eq!(parse_hops(output), addrs(&["203.0.113.1"]));
    }

    #[test]
    fn test_filters_reserved_addresses() {
        let output = "1  127.0.0.1\n2  0.0.0.0\n3  255.255.255.255\n4  255.1.2.3\n5  172.16.0.1";
        assert_eq!(parse_hops(output), addrs(&["172.16.0.1"]));
    }

    #[test]
    fn test_reserved_first_match_discards_line() {
        // Only the first match on a line is considered
        let output = "1  127.0.0.1 10.0.0.1\n2  8.8.8.8";
        assert_eq!(parse_hops(output), addrs(&["8.8.8.8"]));
    }

    #[test]
    fn test_discards_out_of_range_octets() {
        let output = "1  300.1.1.1\n2  8.8.4.4";
        assert_eq!(parse_hops(output), addrs(&["8.8.4.4"]));
    }

    #[test]
    fn test_keeps_repeated_hops_in_order() {
        let output = "1  10.0.0.1\n2  10.0.0.2\n3  10.0.0.1";
        assert_eq!(
            parse_hops(output),
            addrs(&["10.0.0.1", "10.0.0.2", "10.0.0.1"])
        );
    }

    #[test]
    fn test_is_valid_hop() {
        assert!(is_valid_hop("10.0.0.1".parse().unwrap()));
        assert!(is_valid_hop("192.168.1.1".parse().unwrap()));
        assert!(!is_valid_hop("127.8.8.8".parse().unwrap()));
        assert!(!is_valid_hop("0.0.0.0".parse().unwrap()));
        assert!(!is_valid_hop("255.0.0.1".parse().unwrap()));
    }
}
