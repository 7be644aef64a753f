//! Where a controller can be reached

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use chrono::{DateTime, Local, NaiveDateTime};

/// How the gateway learned about a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlcOrigin {
    /// Configured in `static_plcs`
    Static,
    /// Announced itself with a push message
    Push,
    /// Found by broadcast autodetection
    Auto,
    /// Reached through a relay session
    Proxy,
}

impl PlcOrigin {
    pub fn name(self) -> &'static str {
        match self {
            PlcOrigin::Static => "STATIC",
            PlcOrigin::Push => "PUSH",
            PlcOrigin::Auto => "AUTO",
            PlcOrigin::Proxy => "PROXY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlcInfo {
    pub created: DateTime<Local>,
    pub origin: PlcOrigin,
    pub nad: u32,
    /// `0.0.0.0` means the local CAN bus
    pub ip: Option<IpAddr>,
    pub port: u16,
    /// Sent as transaction id when set
    pub password: Option<u16>,
    /// Program timestamp from the last head check
    pub program_datetime: Option<NaiveDateTime>,
    pub last_update_time: DateTime<Local>,
}

impl PlcInfo {
    pub fn addr(&self) -> Option<SocketAddr> {
        self.ip.map(|ip| SocketAddr::new(ip, self.port))
    }
}

impl fmt::Display for PlcInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            Some(ip) => write!(f, "{} c{} {}:{}", self.origin.name(), self.nad, ip, self.port)?,
            None => write!(f, "{} c{} ?:{}", self.origin.name(), self.nad, self.port)?,
        }
        if let Some(password) = self.password {
            write!(f, " password={password}")?;
        }
        if let Some(program) = self.program_datetime {
            write!(f, " program={program}")?;
        }
        Ok(())
    }
}
