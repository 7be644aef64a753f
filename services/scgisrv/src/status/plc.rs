//! `c<NAD>.sys.*` tags

use std::sync::Arc;

use futures::future::join_all;

use crate::alc::AlcService;
use crate::db::models::format_timestamp;
use crate::plc::{DeviceStatus, PlcActivity, PlcActivityService, PlcInfoService};
use crate::rw::{RResponse, RwRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlcStatusTag {
    Timestamp,
    IpPort,
    ResponseTime,
    PlcProgramStatus,
    AlcFileStatus,
    BytesTransferred,
    AlcFile,
    CommErrorCount,
}

impl PlcStatusTag {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "timestamp" => PlcStatusTag::Timestamp,
            "ip_port" => PlcStatusTag::IpPort,
            "response_time" => PlcStatusTag::ResponseTime,
            "plc_program_status" => PlcStatusTag::PlcProgramStatus,
            "alc_file_status" => PlcStatusTag::AlcFileStatus,
            "bytes_transferred" => PlcStatusTag::BytesTransferred,
            "alc_file" => PlcStatusTag::AlcFile,
            "comm_error_count" => PlcStatusTag::CommErrorCount,
            _ => return None,
        })
    }

    fn description(self) -> &'static str {
        match self {
            PlcStatusTag::Timestamp => "Program download timestamp.",
            PlcStatusTag::IpPort => "IP address and UDP port of the controller.",
            PlcStatusTag::ResponseTime => "Last communication cycle duration in milliseconds.",
            PlcStatusTag::PlcProgramStatus => "Program status.",
            PlcStatusTag::AlcFileStatus => "Allocation file status.",
            PlcStatusTag::BytesTransferred => {
                "Total number of bytes sent to and received from controller."
            },
            PlcStatusTag::AlcFile => "Complete allocation file for the controller, in ASCII format.",
            PlcStatusTag::CommErrorCount => "Total number of communication errors for controller.",
        }
    }
}

pub struct PlcStatusService {
    infos: Arc<PlcInfoService>,
    activity: Arc<PlcActivityService>,
    alc: Arc<AlcService>,
}

impl PlcStatusService {
    pub fn new(
        infos: Arc<PlcInfoService>,
        activity: Arc<PlcActivityService>,
        alc: Arc<AlcService>,
    ) -> Self {
        Self {
            infos,
            activity,
            alc,
        }
    }

    pub async fn process(&self, nad: u32, requests: &[RwRequest]) -> Vec<RResponse> {
        join_all(requests.iter().map(|request| self.process_request(nad, request))).await
    }

    async fn process_request(&self, nad: u32, request: &RwRequest) -> RResponse {
        match PlcStatusTag::from_name(&request.tag_name) {
            Some(tag) => RResponse::ok(request, self.value(nad, tag).await, tag.description()),
            None => RResponse::unknown(request),
        }
    }

    async fn value(&self, nad: u32, tag: PlcStatusTag) -> String {
        let activity = self.activity.get(nad);
        match tag {
            PlcStatusTag::Timestamp => self
                .infos
                .get_plc_info(nad)
                .ok()
                .and_then(|info| info.program_datetime)
                .map_or_else(|| "None".to_string(), |t| format_timestamp(&t)),
            PlcStatusTag::IpPort => self.ip_port(nad),
            PlcStatusTag::ResponseTime => response_time(&activity),
            PlcStatusTag::PlcProgramStatus => program_status(activity.device_status()).to_string(),
            PlcStatusTag::AlcFileStatus => alc_file_status(&activity).to_string(),
            PlcStatusTag::BytesTransferred => activity.bytes_transferred.to_string(),
            PlcStatusTag::AlcFile => match activity.last_used_alc_crc {
                Some(crc) => match self.alc.load_alc_text(u32::from(crc)).await {
                    Some(text) => format!("\n{text}\n"),
                    None => String::new(),
                },
                None => String::new(),
            },
            PlcStatusTag::CommErrorCount => activity.failed_exchanges_count.to_string(),
        }
    }

    fn ip_port(&self, nad: u32) -> String {
        match self.infos.get_plc_info(nad) {
            Ok(info) => match info.ip {
                Some(ip) => format!("{}:{}", ip, info.port),
                None => "?".to_string(),
            },
            Err(_) => "?".to_string(),
        }
    }
}

pub(crate) fn response_time(activity: &PlcActivity) -> String {
    activity
        .last_exchange_duration
        .map_or_else(|| "?".to_string(), |d| d.as_millis().to_string())
}

fn program_status(status: DeviceStatus) -> &'static str {
    match status {
        DeviceStatus::Unknown => "?",
        DeviceStatus::Offline => "-",
        DeviceStatus::NoProgram => "missing",
        DeviceStatus::Ok => "ok",
    }
}

pub(crate) fn alc_file_status(activity: &PlcActivity) -> &'static str {
    if activity.device_status() == DeviceStatus::Offline {
        "-"
    } else if activity.last_used_alc_crc.is_some() {
        "ok"
    } else {
        "missing"
    }
}
