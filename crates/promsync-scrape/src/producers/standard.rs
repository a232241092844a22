//! Exporters run by pmm-agent and scraped at one or more resolution tiers.

use promsync_core::catalog::{AgentType, MetricsResolutions, Tier};
use promsync_core::document::ScrapeJob;
use promsync_core::error::ConfigError;

use super::{ScrapeParams, agent_job, with_collectors};
use crate::ScrapeJobProducer;

/// Collectors to enable at each tier for one agent.
pub type TierPlan = Vec<(Tier, Vec<&'static str>)>;

/// A tiered exporter: one job per (agent, tier) with that tier's `collect[]`.
pub struct StandardExporter {
    agent_type: AgentType,
    plan: fn(&ScrapeParams<'_>) -> TierPlan,
}

impl StandardExporter {
    pub fn new(agent_type: AgentType, plan: fn(&ScrapeParams<'_>) -> TierPlan) -> Self {
        Self { agent_type, plan }
    }
}

impl ScrapeJobProducer for StandardExporter {
    fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    fn produce(
        &self,
        agents: &[ScrapeParams<'_>],
        resolutions: &MetricsResolutions,
    ) -> Result<Vec<ScrapeJob>, ConfigError> {
        let mut jobs = Vec::new();
        for params in agents {
            for (tier, collect) in (self.plan)(params) {
                let job = agent_job(params, tier, resolutions)?;
                jobs.push(with_collectors(job, &collect));
            }
        }
        Ok(jobs)
    }
}

pub fn node_exporter() -> StandardExporter {
    StandardExporter::new(AgentType::NodeExporter, node_plan)
}

pub fn mysqld_exporter() -> StandardExporter {
    StandardExporter::new(AgentType::MysqldExporter, mysqld_plan)
}

pub fn postgres_exporter() -> StandardExporter {
    StandardExporter::new(AgentType::PostgresExporter, postgres_plan)
}

pub fn mongodb_exporter() -> StandardExporter {
    StandardExporter::new(AgentType::MongodbExporter, |_| vec![(Tier::Hr, vec![])])
}

pub fn proxysql_exporter() -> StandardExporter {
    StandardExporter::new(AgentType::ProxysqlExporter, |_| vec![(Tier::Hr, vec![])])
}

const NODE_HR_COMMON: &[&str] = &[
    "cpu",
    "diskstats",
    "filesystem",
    "loadavg",
    "meminfo",
    "netdev",
    "time",
];

fn node_plan(params: &ScrapeParams<'_>) -> TierPlan {
    let darwin = params
        .node
        .and_then(|n| n.distro.as_deref())
        .is_some_and(|d| d == "darwin");
    if darwin {
        return vec![(Tier::Hr, NODE_HR_COMMON.to_vec())];
    }

    let mut hr = vec![
        "buddyinfo",
        "filefd",
        "meminfo_numa",
        "netstat",
        "processes",
        "standard.go",
        "standard.process",
        "stat",
        "textfile.hr",
        "vmstat",
    ];
    hr.extend_from_slice(NODE_HR_COMMON);

    vec![
        (Tier::Hr, hr),
        (Tier::Mr, vec!["hwmon", "textfile.mr"]),
        (Tier::Lr, vec!["bonding", "entropy", "textfile.lr", "uname"]),
    ]
}

fn mysqld_plan(params: &ScrapeParams<'_>) -> TierPlan {
    let hr = vec![
        "global_status",
        "info_schema.innodb_metrics",
        "custom_query.hr",
        "standard.go",
        "standard.process",
    ];

    let mut mr = vec![
        "engine_innodb_status",
        "info_schema.innodb_cmp",
        "info_schema.innodb_cmpmem",
        "info_schema.processlist",
        "info_schema.query_response_time",
        "perf_schema.eventswaits",
        "perf_schema.file_events",
        "slave_status",
        "custom_query.mr",
    ];

    let mut lr = vec![
        "binlog_size",
        "engine_tokudb_status",
        "global_variables",
        "heartbeat",
        "info_schema.clientstats",
        "info_schema.innodb_tablespaces",
        "info_schema.userstats",
        "perf_schema.eventsstatements",
        "perf_schema.file_instances",
        "custom_query.lr",
    ];

    if params.agent.tablestats_group_enabled {
        mr.push("perf_schema.tablelocks");
        lr.extend([
            "auto_increment.columns",
            "info_schema.tables",
            "info_schema.tablestats",
            "perf_schema.indexiowaits",
            "perf_schema.tableiowaits",
        ]);
    }

    vec![(Tier::Hr, hr), (Tier::Mr, mr), (Tier::Lr, lr)]
}

fn postgres_plan(_params: &ScrapeParams<'_>) -> TierPlan {
    vec![
        (
            Tier::Hr,
            vec!["exporter", "custom_query.hr", "standard.go", "standard.process"],
        ),
        (Tier::Mr, vec!["custom_query.mr"]),
        (Tier::Lr, vec!["custom_query.lr"]),
    ]
}
