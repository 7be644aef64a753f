//! `sys.*` tags

use std::sync::Arc;

use crate::core::config::Config;
use crate::core::constants::APP_VERSION;
use crate::datalogger::DataLoggerActivityService;
use crate::plc::{PlcActivityService, PlcInfoService, PlcOrigin, PlcStatus, PushActivity};
use crate::proxy::ProxyActivityService;
use crate::rw::{RResponse, ResponseValue, RwRequest};
use crate::scgi::ScgiActivity;
use crate::transport::UdpActivity;
use crate::utils::text::{humanize_duration, tabulate};

use super::plc::{alc_file_status, response_time};

const LIST_TIME_FORMAT: &str = "%d-%m-%y %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SystemTag {
    ScgiPortStatus,
    ScgiRequestCount,
    ScgiRequestPending,
    ServerVersion,
    ServerUptime,
    CacheValid,
    CacheRequest,
    PushPortStatus,
    PushCount,
    PushListCount,
    PushAckErrors,
    NadList,
    PushList,
    UdpRxCount,
    UdpTxCount,
    AbusList,
    DataloggerStatus,
    DataloggerList,
    ProxyActivityList,
}

impl SystemTag {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "scgi_port_status" => SystemTag::ScgiPortStatus,
            "scgi_request_count" => SystemTag::ScgiRequestCount,
            "scgi_request_pending" => SystemTag::ScgiRequestPending,
            "server_version" => SystemTag::ServerVersion,
            "server_uptime" => SystemTag::ServerUptime,
            "cache_valid" => SystemTag::CacheValid,
            "cache_request" => SystemTag::CacheRequest,
            "push_port_status" => SystemTag::PushPortStatus,
            "push_count" => SystemTag::PushCount,
            "push_list_count" => SystemTag::PushListCount,
            "push_ack_errors" => SystemTag::PushAckErrors,
            "nad_list" => SystemTag::NadList,
            "push_list" => SystemTag::PushList,
            "udp_rx_count" => SystemTag::UdpRxCount,
            "udp_tx_count" => SystemTag::UdpTxCount,
            "abus_list" => SystemTag::AbusList,
            "datalogger_status" => SystemTag::DataloggerStatus,
            "datalogger_list" => SystemTag::DataloggerList,
            "proxy_activity_list" => SystemTag::ProxyActivityList,
            _ => return None,
        })
    }

    fn description(self) -> &'static str {
        match self {
            SystemTag::ScgiPortStatus => "SCGI port status can be 'active' or empty (server is down).",
            SystemTag::ScgiRequestCount => "Total number of executed requests since startup.",
            SystemTag::ScgiRequestPending => "Number of requests pending to be processed.",
            SystemTag::ServerVersion => "Server version, 'major.minor.release'.",
            SystemTag::ServerUptime => {
                "Time since the server is started, 'hh:mm:ss' or 'xx days, hh:mm:ss'."
            },
            SystemTag::CacheValid => {
                "Time in seconds after cached value is invalidated. If value is 0, cache is disabled."
            },
            SystemTag::CacheRequest => {
                "Time in seconds after data is read from cache, but communication request is \
                 initiated. If value is 0, no requests are generated until cache expires."
            },
            SystemTag::PushPortStatus => "Push port status can be 'active' or 'inactive'.",
            SystemTag::PushCount => "Total number of push messages received from controllers.",
            SystemTag::PushListCount => "Total number of controllers in push list.",
            SystemTag::PushAckErrors => "Total number of push acknowledge errors.",
            SystemTag::NadList => {
                "List of available controllers, push and autodetect list combined."
            },
            SystemTag::PushList => {
                "Push list represents the list of Cybro controllers that sent push message to \
                 the server, containing last message timestamp, controller NAD, IP address and \
                 port, controller status, program status, allocation status, last program \
                 timestamp, response time in milliseconds and last plc info update time."
            },
            SystemTag::UdpRxCount => "Total number of UDP packets received through UDP proxy.",
            SystemTag::UdpTxCount => "Total number of UDP packets transmitted through UDP proxy.",
            SystemTag::AbusList => {
                "Abus list contains detailed information for low level communication between \
                 SCGI server and Cybro controllers. It is shown NAD, total number of abus \
                 messages, number of abus errors, last error timestamp, last error code and \
                 bandwidth used for each controller. Bandwidth represents the amount of time \
                 spent for communication in last 60 seconds for particular controller."
            },
            SystemTag::DataloggerStatus => "Datalogger module can be 'active' or 'stopped'.",
            SystemTag::DataloggerList => {
                "DataLogger list contains detailed data for datalogger sample, alarm type of \
                 task, number of tags for this type of task, number of tasks for this type, \
                 number of tasks triggering, last trigger timestamp, number of correctly read \
                 tags, number of unknown tags or for some other reason not read tags, last \
                 communication status and complete task execution time."
            },
            SystemTag::ProxyActivityList => {
                "Proxy activity list represents data for proxy activity - last_msg, \
                 last_plc_nad, msg_count_rx, msg_count_tx"
            },
        }
    }
}

pub struct SystemStatusService {
    config: Arc<Config>,
    infos: Arc<PlcInfoService>,
    push_activity: Arc<PushActivity>,
    scgi_activity: Arc<ScgiActivity>,
    plc_activity: Arc<PlcActivityService>,
    udp_activity: Arc<UdpActivity>,
    datalogger_activity: Arc<DataLoggerActivityService>,
    proxy_activity: Arc<ProxyActivityService>,
}

impl SystemStatusService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        infos: Arc<PlcInfoService>,
        push_activity: Arc<PushActivity>,
        scgi_activity: Arc<ScgiActivity>,
        plc_activity: Arc<PlcActivityService>,
        udp_activity: Arc<UdpActivity>,
        datalogger_activity: Arc<DataLoggerActivityService>,
        proxy_activity: Arc<ProxyActivityService>,
    ) -> Self {
        Self {
            config,
            infos,
            push_activity,
            scgi_activity,
            plc_activity,
            udp_activity,
            datalogger_activity,
            proxy_activity,
        }
    }

    pub async fn process(&self, requests: &[RwRequest]) -> Vec<RResponse> {
        requests
            .iter()
            .map(|request| match SystemTag::from_name(&request.tag_name) {
                Some(tag) => RResponse::ok(request, self.value(tag), tag.description()),
                None => RResponse::unknown(request),
            })
            .collect()
    }

    fn value(&self, tag: SystemTag) -> ResponseValue {
        let text = match tag {
            SystemTag::ScgiPortStatus => "active".to_string(),
            SystemTag::ScgiRequestCount => self.scgi_activity.requests_received().to_string(),
            SystemTag::ScgiRequestPending => self.scgi_activity.pending().to_string(),
            SystemTag::ServerVersion => APP_VERSION.to_string(),
            SystemTag::ServerUptime => humanize_duration(self.scgi_activity.uptime()),
            SystemTag::CacheValid => self.config.cache.valid_period_s.to_string(),
            SystemTag::CacheRequest => self.config.cache.request_period_s.to_string(),
            SystemTag::PushPortStatus => active_or(self.config.push.enabled, "inactive"),
            SystemTag::PushCount => self
                .push_activity
                .successful_push_acknowledgments_count()
                .to_string(),
            SystemTag::PushListCount => self
                .infos
                .plc_infos_by_origin(PlcOrigin::Push)
                .len()
                .to_string(),
            SystemTag::PushAckErrors => self
                .push_activity
                .failed_push_acknowledgments_count()
                .to_string(),
            SystemTag::NadList => {
                return ResponseValue::List(
                    self.infos
                        .plc_infos()
                        .iter()
                        .map(|info| info.nad.to_string())
                        .collect(),
                );
            },
            SystemTag::PushList => self.push_list(),
            SystemTag::UdpRxCount => self.udp_activity.rx_count().to_string(),
            SystemTag::UdpTxCount => self.udp_activity.tx_count().to_string(),
            SystemTag::AbusList => self.abus_list(),
            SystemTag::DataloggerStatus => active_or(self.config.datalogger.enabled, "stopped"),
            SystemTag::DataloggerList => self.datalogger_list(),
            SystemTag::ProxyActivityList => self.proxy_activity_list(),
        };
        ResponseValue::Text(text)
    }

    fn push_list(&self) -> String {
        let rows: Vec<Vec<String>> = self
            .infos
            .plc_infos_by_origin(PlcOrigin::Push)
            .iter()
            .map(|info| {
                let activity = self.plc_activity.get(info.nad);
                let ip = info.ip.map_or_else(|| "?".to_string(), |ip| ip.to_string());
                vec![
                    info.created.format(LIST_TIME_FORMAT).to_string(),
                    info.nad.to_string(),
                    format!("{}:{}", ip, info.port),
                    activity
                        .last_plc_status
                        .map_or("?", plc_status_name)
                        .to_string(),
                    info.program_datetime
                        .map_or_else(|| "?".to_string(), |t| t.format(LIST_TIME_FORMAT).to_string()),
                    alc_file_status(&activity).to_string(),
                    "N/A".to_string(),
                    response_time(&activity),
                    info.last_update_time.format(LIST_TIME_FORMAT).to_string(),
                ]
            })
            .collect();
        tabulate(
            &[10, 10, 20, 15, 20, 15, 20, 20, 35],
            &[
                "push",
                "nad",
                "ip:port",
                "status",
                "program",
                "alc",
                "downloaded",
                "response",
                "last_update_time",
            ],
            &rows,
        )
    }

    fn abus_list(&self) -> String {
        let rows: Vec<Vec<String>> = self
            .infos
            .plc_infos()
            .iter()
            .map(|info| {
                let activity = self.plc_activity.get(info.nad);
                vec![
                    info.nad.to_string(),
                    activity.initiated_exchanges_count.to_string(),
                    activity.failed_exchanges_count.to_string(),
                    activity.last_failed_exchange_time.map_or_else(
                        || "None".to_string(),
                        |t| t.format(LIST_TIME_FORMAT).to_string(),
                    ),
                    info.ip.map_or_else(|| "None".to_string(), |ip| ip.to_string()),
                    info.port.to_string(),
                    info.origin.name().to_string(),
                ]
            })
            .collect();
        tabulate(
            &[15, 15, 15, 20, 20, 15, 15],
            &["nad", "total", "errors", "last error at", "ip", "port", "origin"],
            &rows,
        )
    }

    fn datalogger_list(&self) -> String {
        let rows: Vec<Vec<String>> = ["sample", "alarm"]
            .iter()
            .zip(self.datalogger_activity.summaries())
            .map(|(kind, s)| {
                vec![
                    kind.to_string(),
                    s.tag_count.to_string(),
                    s.task_count.to_string(),
                    s.trigger_count.to_string(),
                    s.valid_results.to_string(),
                    s.invalid_results.to_string(),
                    s.last_trigger,
                    s.duration,
                ]
            })
            .collect();
        tabulate(
            &[15, 15, 15, 15, 20, 20, 20, 20],
            &[
                "type",
                "tags",
                "tasks",
                "trigger count",
                "read tags",
                "unknown tags",
                "last trigger",
                "duration",
            ],
            &rows,
        )
    }

    fn proxy_activity_list(&self) -> String {
        let rows: Vec<Vec<String>> = self
            .proxy_activity
            .entries()
            .into_iter()
            .map(|(session_id, activity)| {
                vec![
                    session_id.to_string(),
                    activity.last_msg.format(LIST_TIME_FORMAT).to_string(),
                    activity.last_plc_nad.to_string(),
                    activity.msg_count_rx.to_string(),
                    activity.msg_count_tx.to_string(),
                ]
            })
            .collect();
        tabulate(
            &[20; 5],
            &["session_id", "last_msg", "last_plc_nad", "msg_count_rx", "msg_count_tx"],
            &rows,
        )
    }
}

fn active_or(active: bool, otherwise: &str) -> String {
    let status = if active { "active" } else { otherwise };
    status.to_string()
}

fn plc_status_name(status: PlcStatus) -> &'static str {
    match status {
        PlcStatus::Stop => "STOP",
        PlcStatus::Pause => "PAUSE",
        PlcStatus::Run => "RUN",
        PlcStatus::NoValidProgram => "NO_VALID_PROGRAM",
        PlcStatus::ScanOverrunError => "SCAN_OVERRUN_ERROR",
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::db::InMemoryRepository;
    use crate::rw::Code;
    use std::time::Duration;

    struct Fixture {
        service: SystemStatusService,
        infos: Arc<PlcInfoService>,
        scgi: Arc<ScgiActivity>,
        plc_activity: Arc<PlcActivityService>,
        proxy: Arc<ProxyActivityService>,
    }

    fn fixture(config: Config) -> Fixture {
        let infos = Arc::new(PlcInfoService::new(None));
        let scgi = Arc::new(ScgiActivity::new());
        let plc_activity = Arc::new(PlcActivityService::new());
        let proxy = Arc::new(ProxyActivityService::new(
            infos.clone(),
            Arc::new(InMemoryRepository::new()),
        ));
        let service = SystemStatusService::new(
            Arc::new(config),
            infos.clone(),
            Arc::new(PushActivity::default()),
            scgi.clone(),
            plc_activity.clone(),
            Arc::new(UdpActivity::default()),
            Arc::new(DataLoggerActivityService::new()),
            proxy.clone(),
        );
        Fixture {
            service,
            infos,
            scgi,
            plc_activity,
            proxy,
        }
    }

    async fn read(service: &SystemStatusService, tag: &str) -> RResponse {
        let request = RwRequest::read(&format!("sys.{tag}")).unwrap();
        service.process(&[request]).await.remove(0)
    }

    #[tokio::test]
    async fn test_scalar_tags() {
        let mut config = Config::default();
        config.cache.valid_period_s = 30;
        config.push.enabled = true;
        config.datalogger.enabled = false;
        let f = fixture(config);
        f.scgi.report_request_received();

        assert_eq!(read(&f.service, "scgi_port_status").await.value.to_string(), "active");
        assert_eq!(read(&f.service, "scgi_request_count").await.value.to_string(), "1");
        assert_eq!(read(&f.service, "scgi_request_pending").await.value.to_string(), "1");
        assert_eq!(read(&f.service, "server_version").await.value.to_string(), APP_VERSION);
        assert_eq!(read(&f.service, "cache_valid").await.value.to_string(), "30");
        assert_eq!(read(&f.service, "push_port_status").await.value.to_string(), "active");
        assert_eq!(read(&f.service, "datalogger_status").await.value.to_string(), "stopped");
        assert!(read(&f.service, "server_uptime")
            .await
            .value
            .to_string()
            .starts_with("0 days, 00:00:"));
    }

    #[tokio::test]
    async fn test_nad_list_and_counts() {
        let f = fixture(Config::default());
        f.infos.update(1000, Some("10.0.0.1".parse().unwrap()), None, PlcOrigin::Push);
        f.infos.update(1001, Some("10.0.0.2".parse().unwrap()), None, PlcOrigin::Auto);

        let nads = read(&f.service, "nad_list").await;
        assert_eq!(nads.value, ResponseValue::List(vec!["1000".into(), "1001".into()]));
        assert_eq!(read(&f.service, "push_list_count").await.value.to_string(), "1");
    }

    #[tokio::test]
    async fn test_abus_list_rows() {
        let f = fixture(Config::default());
        f.infos.update(1000, Some("10.0.0.1".parse().unwrap()), None, PlcOrigin::Auto);
        f.plc_activity.report_exchange_initiated(1000);
        f.plc_activity.report_exchange_succeeded(1000, 10, Duration::from_millis(1));

        let table = read(&f.service, "abus_list").await.value.to_string();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "");
        assert!(lines[1].starts_with("      nad      |     total     |"));
        assert_eq!(lines[2], "_".repeat(115));
        assert!(lines[3].starts_with("1000           |1              |0              |None"));
        assert!(lines[3].ends_with("|AUTO           "));
    }

    #[tokio::test]
    async fn test_proxy_list_counts_both_directions() {
        let f = fixture(Config::default());
        f.proxy.report_to_plc(77, 1000);
        f.proxy.report_to_plc(77, 1000);
        f.proxy.report_from_plc(77, 1000);

        let table = read(&f.service, "proxy_activity_list").await.value.to_string();
        let row = table.lines().nth(3).unwrap();
        let cells: Vec<&str> = row.split('|').map(str::trim).collect();
        assert_eq!(cells[0], "77");
        assert_eq!(cells[2..], ["1000", "2", "1"]);
    }

    #[tokio::test]
    async fn test_datalogger_list_has_two_rows() {
        let f = fixture(Config::default());
        let table = read(&f.service, "datalogger_list").await.value.to_string();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[3].starts_with("sample"));
        assert!(lines[4].starts_with("alarm"));
    }

    #[tokio::test]
    async fn test_unknown_tag() {
        let f = fixture(Config::default());
        assert_eq!(read(&f.service, "nope").await.code, Code::Unknown);
    }
}
