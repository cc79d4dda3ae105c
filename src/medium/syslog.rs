//! Syslog medium: line-per-message datagrams over UDP.

use std::net::UdpSocket;
use std::sync::Arc;

use super::{Medium, MediumCtor};
use crate::error::{Error, Result};
use crate::extension::{ArgSpec, Descriptor, ExtensionArgs};
use crate::record::Payload;

// PRI 14 = facility user (1) * 8 + severity informational (6).
const PRI: u8 = 14;

/// Sends each line of a text batch as one RFC 3164-style UDP datagram.
pub struct SyslogMedium {
    socket: UdpSocket,
    address: String,
    tag: String,
}

impl SyslogMedium {
    /// Connect the medium to a `host:port` syslog address.
    pub fn connect(address: &str, tag: &str) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .map_err(|e| Error::Config(format!("cannot bind UDP socket: {e}")))?;
        socket
            .connect(address)
            .map_err(|e| Error::Config(format!("cannot resolve syslog address {address:?}: {e}")))?;
        Ok(Self {
            socket,
            address: address.to_string(),
            tag: tag.to_string(),
        })
    }
}

impl Medium for SyslogMedium {
    fn write(&self, payload: &Payload) -> Result<()> {
        let text = payload.as_text().ok_or_else(|| Error::MediumWrite {
            cause: "syslog medium only accepts text batches".to_string(),
            retriable: false,
        })?;

        for line in text.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let message = format!("<{}>{}: {}", PRI, self.tag, line);
            self.socket
                .send(message.as_bytes())
                .map_err(|e| Error::MediumWrite {
                    cause: format!("send to {} failed: {e}", self.address),
                    retriable: true,
                })?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "syslog"
    }
}

fn construct(args: &ExtensionArgs) -> Result<Arc<dyn Medium>> {
    let address = args
        .get_str("address")
        .unwrap_or_else(|| "127.0.0.1:514".to_string());
    let tag = args.get_str("tag").unwrap_or_else(|| "avalon".to_string());
    Ok(Arc::new(SyslogMedium::connect(&address, &tag)?))
}

/// Descriptor for the built-in `syslog` medium.
pub fn descriptor() -> Descriptor<MediumCtor> {
    Descriptor::new("syslog", construct as MediumCtor).with_args(vec![
        ArgSpec::value("syslog-address", "<host:port>", "Syslog UDP destination")
            .default_str("127.0.0.1:514"),
        ArgSpec::value("syslog-tag", "<tag>", "Tag prepended to each message")
            .default_str("avalon"),
    ])
}
