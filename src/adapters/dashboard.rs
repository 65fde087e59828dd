//! Monitoring-dashboard links built from remote entities.

use anyhow::Context;
use reqwest::Url;

use super::RemoteEntities;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1/Winnum/views/pages/app/agw.jsp";

const PRODUCT_PREFIXES: &[(&str, &str)] = &[
    ("станок", "WNProduct:"),
    ("пресс", "WNPress:"),
    ("робот", "WNRobot:"),
    ("двигатель", "WNMotor:"),
    ("электродвигатель", "WNMotor:"),
    ("насос", "WNPump:"),
];
const DEFAULT_PRODUCT_PREFIX: &str = "WNProduct:";

const TAG_IDS: &[(&str, &str)] = &[
    ("вибрация", "NC_VIBRATION"),
    ("температура", "NC_TEMPERATURE"),
    ("давление", "NC_PRESSURE"),
    ("шум", "NC_NOISE"),
    ("перегрев", "NC_OVERHEATING"),
    ("коррозия", "NC_CORROSION"),
];
const DEFAULT_TAG_ID: &str = "NC_DEFAULT";

/// Tag-calculation link for one piece of equipment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardLink {
    /// Product id, e.g. "WNPress:3"
    pub pid: Option<String>,
    /// Tag id, e.g. "NC_VIBRATION"
    pub tid: Option<String>,
}

impl DashboardLink {
    /// Product id needs both equipment and number; tag id needs a symptom
    pub fn from_entities(entities: &RemoteEntities) -> Self {
        let pid = match (&entities.equipment, &entities.number) {
            (Some(equipment), Some(number)) => {
                let equipment = equipment.trim().to_lowercase();
                let prefix = lookup(PRODUCT_PREFIXES, &equipment).unwrap_or(DEFAULT_PRODUCT_PREFIX);
                Some(format!("{prefix}{}", number.trim()))
            }
            _ => None,
        };
        let tid = entities.symptom.as_ref().map(|symptom| {
            lookup(TAG_IDS, &symptom.trim().to_lowercase())
                .unwrap_or(DEFAULT_TAG_ID)
                .to_string()
        });
        Self { pid, tid }
    }

    /// Full URL against `base`; parameters are percent-encoded
    pub fn url(&self, base: &str) -> anyhow::Result<Url> {
        let mut params = vec![
            ("rpc", "WNApplicationTagHelper.getTagCalculationValue"),
            ("mode", "yes"),
            ("appid", "winnum.org.app.WNApplicationInstance:1"),
            ("from", "now-2h"),
            ("till", "now"),
        ];
        if let Some(pid) = &self.pid {
            params.push(("pid", pid.as_str()));
        }
        if let Some(tid) = &self.tid {
            params.push(("tid", tid.as_str()));
        }
        Url::parse_with_params(base, &params).with_context(|| format!("Invalid dashboard base URL: {base}"))
    }
}

fn lookup(table: &[(&str, &'static str)], key: &str) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entities(equipment: Option<&str>, number: Option<&str>, symptom: Option<&str>) -> RemoteEntities {
        RemoteEntities {
            equipment: equipment.map(String::from),
            number: number.map(String::from),
            symptom: symptom.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_known_equipment_and_symptom() {
        let link = DashboardLink::from_entities(&entities(Some("Пресс"), Some("3"), Some("вибрация")));
        assert_eq!(link.pid.as_deref(), Some("WNPress:3"));
        assert_eq!(link.tid.as_deref(), Some("NC_VIBRATION"));
    }

    #[test]
    fn test_defaults_for_unknown_values() {
        let link = DashboardLink::from_entities(&entities(Some("печь"), Some("1"), Some("утечка")));
        assert_eq!(link.pid.as_deref(), Some("WNProduct:1"));
        assert_eq!(link.tid.as_deref(), Some("NC_DEFAULT"));
    }

    #[test]
    fn test_missing_number_omits_pid() {
        let link = DashboardLink::from_entities(&entities(Some("насос"), None, None));
        assert_eq!(link, DashboardLink { pid: None, tid: None });
    }

    #[test]
    fn test_url_parameters() {
        let link = DashboardLink::from_entities(&entities(Some("робот"), Some("7"), Some("шум")));
        let url = link.url(DEFAULT_BASE_URL).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("rpc".to_string(), "WNApplicationTagHelper.getTagCalculationValue".to_string()));
        assert!(pairs.contains(&("pid".to_string(), "WNRobot:7".to_string())));
        assert!(pairs.contains(&("tid".to_string(), "NC_NOISE".to_string())));
        assert_eq!(url.path(), "/Winnum/views/pages/app/agw.jsp");
    }
}
