//! Registry of known controllers
//!
//! One `PlcInfo` per nad. Every set and remove is reported to the
//! registered listener (the client manager) after the lock is released.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{OnceLock, Weak};

use chrono::{Local, NaiveDateTime};
use parking_lot::RwLock;
use tracing::debug;

use super::info::{PlcInfo, PlcOrigin};
use crate::core::config::StaticPlc;
use crate::core::constants::ABUS_PORT;
use crate::error::{Result, ScgiSrvError};

pub trait PlcInfoListener: Send + Sync {
    fn on_plc_info_set(&self, info: &PlcInfo);
    fn on_plc_info_removed(&self, nad: u32);
}

pub struct PlcInfoService {
    default_password: Option<u16>,
    infos: RwLock<BTreeMap<u32, PlcInfo>>,
    listener: OnceLock<Weak<dyn PlcInfoListener>>,
}

impl PlcInfoService {
    pub fn new(default_password: Option<u16>) -> Self {
        Self {
            default_password,
            infos: RwLock::new(BTreeMap::new()),
            listener: OnceLock::new(),
        }
    }

    pub fn set_listener(&self, listener: Weak<dyn PlcInfoListener>) {
        if self.listener.set(listener).is_err() {
            debug!("Plc info listener already registered");
        }
    }

    fn listener(&self) -> Option<std::sync::Arc<dyn PlcInfoListener>> {
        self.listener.get().and_then(Weak::upgrade)
    }

    /// New record; `0.0.0.0` forces port 0, missing port is the ABUS port
    pub fn create(
        &self,
        origin: PlcOrigin,
        nad: u32,
        ip: Option<IpAddr>,
        port: Option<u16>,
        password: Option<u16>,
        program_datetime: Option<NaiveDateTime>,
    ) -> PlcInfo {
        let now = Local::now();
        PlcInfo {
            created: now,
            origin,
            nad,
            ip,
            port: normalize_port(ip, port),
            password: password.or(self.default_password),
            program_datetime,
            last_update_time: now,
        }
    }

    pub fn load_static_plc_infos(&self, plcs: &[StaticPlc]) {
        for plc in plcs {
            let info = self.create(PlcOrigin::Static, plc.nad, plc.ip, plc.port, plc.password, None);
            self.set_plc_info(info);
        }
    }

    /// Replace the record unless ip, port and origin are unchanged
    pub fn update(&self, nad: u32, ip: Option<IpAddr>, port: Option<u16>, origin: PlcOrigin) -> PlcInfo {
        let port = normalize_port(ip, port);
        let existing = self.infos.read().get(&nad).cloned();
        let info = match existing {
            Some(old) if old.ip == ip && old.port == port && old.origin == origin => return old,
            Some(old) => self.create(origin, nad, ip, Some(port), old.password, None),
            None => self.create(origin, nad, ip, Some(port), None, None),
        };
        self.set_plc_info(info.clone());
        info
    }

    pub fn update_program_datetime(&self, nad: u32, program_datetime: NaiveDateTime) -> Result<PlcInfo> {
        let old = self.get_plc_info(nad)?;
        if old.program_datetime == Some(program_datetime) {
            return Ok(old);
        }
        let info = self.create(
            old.origin,
            old.nad,
            old.ip,
            Some(old.port),
            old.password,
            Some(program_datetime),
        );
        self.set_plc_info(info.clone());
        Ok(info)
    }

    pub fn get_plc_info(&self, nad: u32) -> Result<PlcInfo> {
        self.infos
            .read()
            .get(&nad)
            .cloned()
            .ok_or(ScgiSrvError::PlcInfoNotFound(nad))
    }

    pub fn contains(&self, nad: u32) -> bool {
        self.infos.read().contains_key(&nad)
    }

    pub fn set_plc_info(&self, info: PlcInfo) {
        debug!("Added plc info c{}: {}", info.nad, info);
        self.infos.write().insert(info.nad, info.clone());
        if let Some(listener) = self.listener() {
            listener.on_plc_info_set(&info);
        }
    }

    pub fn remove_plc_info(&self, nad: u32) -> Option<PlcInfo> {
        let removed = self.infos.write().remove(&nad);
        if removed.is_some() {
            debug!("Removed plc info c{}", nad);
            if let Some(listener) = self.listener() {
                listener.on_plc_info_removed(nad);
            }
        }
        removed
    }

    /// Snapshot ordered by nad
    pub fn plc_infos(&self) -> Vec<PlcInfo> {
        self.infos.read().values().cloned().collect()
    }

    pub fn plc_infos_by_origin(&self, origin: PlcOrigin) -> Vec<PlcInfo> {
        self.infos
            .read()
            .values()
            .filter(|info| info.origin == origin)
            .cloned()
            .collect()
    }

    pub fn non_proxy_plc_infos(&self) -> Vec<PlcInfo> {
        self.infos
            .read()
            .values()
            .filter(|info| info.origin != PlcOrigin::Proxy)
            .cloned()
            .collect()
    }
}

fn normalize_port(ip: Option<IpAddr>, port: Option<u16>) -> u16 {
    if ip == Some(IpAddr::V4(Ipv4Addr::UNSPECIFIED)) {
        0
    } else {
        port.unwrap_or(ABUS_PORT)
    }
}
