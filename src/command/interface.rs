//! `create`, `delete` and `set` handlers

use super::{need, parse_num, Session};
use crate::addr::{IfAddr, MacAddr};
use crate::iface::{Capabilities, InterfaceKind, MediaWord};
use crate::{Error, Result};
use std::io::Write;
use std::net::Ipv4Addr;

const CREATE_USAGE: &str = "create interface <type> [name]";
const DELETE_USAGE: &str = "delete interface <name> [fib | address <addr> | group <group>]";
const SET_USAGE: &str = "set interface <name> <property> [value...] | set system <knob> on|off";

fn expect_object(tokens: &[&str], object: &str, usage: &str) -> Result<()> {
    if !tokens[1].eq_ignore_ascii_case(object) {
        return Err(Error::Usage(usage.to_string()));
    }
    Ok(())
}

pub(super) fn create(session: &mut Session, tokens: &[&str]) -> Result<()> {
    need(tokens, 3, CREATE_USAGE)?;
    expect_object(tokens, "interface", CREATE_USAGE)?;
    if tokens.len() > 4 {
        return Err(Error::Usage(CREATE_USAGE.to_string()));
    }
    let kind: InterfaceKind = tokens[2].parse()?;
    let iface = session.registry.create_interface(kind, tokens.get(3).copied())?;
    writeln!(session.out, "{}", iface.name())?;
    Ok(())
}

pub(super) fn delete(session: &mut Session, tokens: &[&str]) -> Result<()> {
    need(tokens, 3, DELETE_USAGE)?;
    expect_object(tokens, "interface", DELETE_USAGE)?;
    let name = tokens[2];
    let mut iface = session.registry.require_interface(name)?;

    match tokens.get(3).map(|t| t.to_ascii_lowercase()).as_deref() {
        None => {
            iface.destroy()?;
            session.bridges.forget(name);
            Ok(())
        }
        Some("fib") => iface.reset_fib(),
        Some("address") | Some("inet") => {
            need(tokens, 5, DELETE_USAGE)?;
            iface.remove_address(parse_host(tokens[4])?)
        }
        Some("group") => {
            need(tokens, 5, DELETE_USAGE)?;
            iface.remove_from_group(tokens[4])
        }
        Some(_) => Err(Error::Usage(DELETE_USAGE.to_string())),
    }
}

/// Accepts `192.0.2.1` or `192.0.2.1/24`; only the address matters.
fn parse_host(s: &str) -> Result<Ipv4Addr> {
    let addr: IfAddr = s
        .parse()
        .map_err(|e| Error::Parse(format!("{}: {}", s, e)))?;
    Ok(addr.addr)
}

/// First argument after the property, or a usage error naming its form.
fn value<'a>(args: &[&'a str], usage: &str) -> Result<&'a str> {
    args.first()
        .copied()
        .ok_or_else(|| Error::Usage(format!("set interface <name> {}", usage)))
}

pub(super) fn set(session: &mut Session, tokens: &[&str]) -> Result<()> {
    need(tokens, 2, SET_USAGE)?;
    if tokens[1].eq_ignore_ascii_case("system") {
        return super::system::set(session, tokens);
    }
    need(tokens, 4, SET_USAGE)?;
    expect_object(tokens, "interface", SET_USAGE)?;
    let mut iface = session.registry.require_interface(tokens[2])?;
    let property = tokens[3].to_ascii_lowercase();
    let args = &tokens[4..];

    match property.as_str() {
        "up" => iface.set_up(true),
        "down" => iface.set_up(false),
        "fib" => iface.set_fib(parse_num("fib", value(args, "fib <n>")?)?),
        "mtu" => iface.set_mtu(parse_num("mtu", value(args, "mtu <n>")?)?),
        "mac" | "ether" | "lladdr" => {
            let raw = value(args, "mac <addr>")?;
            let mac: MacAddr = raw
                .parse()
                .map_err(|e| Error::Parse(format!("{}: {}", raw, e)))?;
            iface.set_mac_address(mac)
        }
        "media" => {
            let media = value(args, "media <media> [full-duplex | half-duplex]")?;
            iface.set_media(MediaWord::parse_ether(media, args.get(1).copied())?)
        }
        "group" => iface.add_to_group(value(args, "group <group>")?),
        "address" | "inet" => {
            let raw = value(args, "address <addr/prefix>")?;
            let addr: IfAddr = raw
                .parse()
                .map_err(|e| Error::Parse(format!("{}: {}", raw, e)))?;
            iface.add_address(addr)
        }
        "capability" | "capabilities" => {
            let usage = "capability enable | disable | set <cap[,cap...]>";
            if args.len() < 2 {
                return Err(Error::Usage(format!("set interface <name> {}", usage)));
            }
            let mask = Capabilities::parse_list(args[1])?;
            match args[0].to_ascii_lowercase().as_str() {
                "enable" => iface.enable_capabilities(mask),
                "disable" => iface.disable_capabilities(mask),
                "set" => iface.set_capabilities(mask),
                _ => Err(Error::Usage(format!("set interface <name> {}", usage))),
            }
        }
        _ => Err(Error::Usage(SET_USAGE.to_string())),
    }
}
