extern crate reqwest;
extern crate serde;
extern crate serde_json;

use itertools::Itertools;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::ser::Serialize;
use serde_json::{to_value, Map, Value};
use std::collections::HashMap;
use value_extensions::*;

pub type Discrete = i32;
pub type Continous = f64;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response from gym server: {0}")]
    Protocol(String),

    #[error("invalid action: {0}")]
    InvalidAction(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObsActSpaceItem {
    Discrete(Discrete),
    Continous(Continous),
}

impl ObsActSpaceItem {
    pub fn discrete_value(&self) -> Option<Discrete> {
        if let Self::Discrete(n) = self {
            Some(*n)
        } else {
            None
        }
    }

    pub fn box_value(&self) -> Option<Continous> {
        if let Self::Continous(n) = self {
            Some(*n)
        } else {
            None
        }
    }

    /// Numeric view of the item, discrete values widened to floats.
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Discrete(n) => *n as f64,
            Self::Continous(x) => *x,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObsActSpace {
    /// Refer: https://www.gymlibrary.dev/api/spaces/#discrete
    Discrete { n: Discrete },

    /// Refer: https://www.gymlibrary.dev/api/spaces/#box
    Box {
        shape: Vec<Discrete>,
        high: Vec<Continous>,
        low: Vec<Continous>,
    },
}

impl ObsActSpace {
    pub fn from_json(info: &Map<String, Value>) -> Result<Self> {
        let name = info
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Protocol("space info has no name".to_string()))?;

        match name {
            "Discrete" => Ok(ObsActSpace::Discrete {
                n: field(info, "n")?
                    .as_i64()
                    .ok_or_else(|| Error::Protocol("Discrete.n is not an integer".to_string()))?
                    as Discrete,
            }),
            "Box" => Ok(ObsActSpace::Box {
                shape: as_discrete_item_vec(field(info, "shape")?)?,
                high: as_continous_item_vec(field(info, "high")?)?,
                low: as_continous_item_vec(field(info, "low")?)?,
            }),
            e => Err(Error::Protocol(format!("unsupported space: {e}"))),
        }
    }

    pub fn items_from_json(&self, vals: &Value) -> Result<Vec<ObsActSpaceItem>> {
        match self {
            // Discrete observations come back as a bare integer.
            ObsActSpace::Discrete { .. } => match vals {
                Value::Array(vs) => vs
                    .iter()
                    .map(|v| as_discrete(v).map(ObsActSpaceItem::Discrete))
                    .collect(),
                v => Ok(vec![ObsActSpaceItem::Discrete(as_discrete(v)?)]),
            },

            ObsActSpace::Box { .. } => match vals {
                Value::Array(vs) => vs
                    .iter()
                    .map(|v| as_continous(v).map(ObsActSpaceItem::Continous))
                    .collect(),
                v => Ok(vec![ObsActSpaceItem::Continous(as_continous(v)?)]),
            },
        }
    }

    pub fn action_to_json(&self, action: &[ObsActSpaceItem]) -> Result<Value> {
        match self {
            ObsActSpace::Discrete { n } => match action {
                [ObsActSpaceItem::Discrete(a)] if (0..*n).contains(a) => Ok(Value::from(*a)),
                [ObsActSpaceItem::Discrete(a)] => Err(Error::InvalidAction(format!(
                    "discrete action {a} outside 0..{n}"
                ))),
                _ => Err(Error::InvalidAction(format!(
                    "expected a single discrete action, got [{}]",
                    action.iter().map(|a| format!("{a:?}")).join(", ")
                ))),
            },

            ObsActSpace::Box { shape, .. } => {
                let expected = shape.iter().product::<Discrete>() as usize;
                if action.len() != expected {
                    return Err(Error::InvalidAction(format!(
                        "expected {expected} continuous actions, got {}",
                        action.len()
                    )));
                }

                let action = action
                    .iter()
                    .map(|a| {
                        a.box_value().ok_or_else(|| {
                            Error::InvalidAction("box actions should all be f64".to_string())
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;

                Ok(Value::from(action))
            }
        }
    }
}

#[derive(Debug)]
pub struct StepInfo {
    pub observation: Vec<ObsActSpaceItem>,
    pub reward: f64,
    pub truncated: bool,
    pub terminated: bool,
    pub info: Value,
}

impl StepInfo {
    pub fn from_json(obs_space: &ObsActSpace, obj: &Value) -> Result<Self> {
        let flag = |name: &str| {
            obj.get(name)
                .and_then(Value::as_bool)
                .ok_or_else(|| Error::Protocol(format!("step response has no '{name}' flag")))
        };

        Ok(Self {
            observation: obs_space.items_from_json(member(obj, "observation")?)?,
            reward: member(obj, "reward")?
                .as_f64()
                .ok_or_else(|| Error::Protocol("reward is not a number".to_string()))?,
            truncated: flag("truncated")?,
            terminated: flag("terminated")?,
            info: obj.get("info").cloned().unwrap_or(Value::Null),
        })
    }
}

/// Create a gymnasium environment or get reference to an existing one.
/// NOTE: All APIs are sync as the server is expected to be local.
#[derive(Debug)]
pub struct Environment {
    client: Client,
    api_url: String,
    instance_id: String,
    obs_space: ObsActSpace,
    act_space: ObsActSpace,
}

impl Environment {
    pub fn envs(api_url: &str) -> Result<HashMap<String, String>> {
        let client = Client::new(api_url)?;

        let url = client.make_api_url("");
        let val = client.http_get(&url)?;

        let obj = val["all_envs"]
            .as_object()
            .ok_or_else(|| Error::Protocol("no all_envs returned".to_string()))?;

        Ok(obj
            .iter()
            .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
            .collect())
    }

    pub fn new(
        api_url: &str,
        env_name: &str,
        max_episode_steps: Option<Discrete>,
        auto_reset: Option<bool>,
        disable_env_checker: Option<bool>,
        kwargs: &[(&str, Value)],
    ) -> Result<Self> {
        let mut body = HashMap::from([("env_id", Value::from(env_name))]);

        if let Some(max_episode_steps) = max_episode_steps {
            body.insert("max_episode_steps", Value::from(max_episode_steps));
        }

        if let Some(auto_reset) = auto_reset {
            body.insert("auto_reset", Value::from(auto_reset));
        }

        if let Some(disable_env_checker) = disable_env_checker {
            body.insert("disable_env_checker", Value::from(disable_env_checker));
        }

        let kwargs = kwargs.iter().cloned().collect::<HashMap<&str, Value>>();
        body.insert(
            "kwargs",
            to_value(kwargs).map_err(|e| Error::Protocol(e.to_string()))?,
        );

        let c = Client::new(api_url)?;
        let base_url = c.make_api_url("");
        let obj = c.http_post(&base_url, &body)?;
        let inst_id = member(&obj, "instance_id")?
            .as_str()
            .ok_or_else(|| Error::Protocol("instance_id is not a string".to_string()))?;
        tracing::debug!(env = env_name, instance = inst_id, "created remote environment");

        Self::reference(api_url, inst_id)
    }

    pub fn reference(api_url: &str, instance_id: &str) -> Result<Self> {
        let client = Client::new(api_url)?;

        let space = |kind: &str| -> Result<ObsActSpace> {
            let url = client.make_api_url(&format!("{instance_id}/{kind}/"));
            let obj = client.http_get(&url)?;
            let info = member(&obj, "info")?
                .as_object()
                .ok_or_else(|| Error::Protocol(format!("{kind} info is not an object")))?;
            ObsActSpace::from_json(info)
        };
        let obs_space = space("observation_space")?;
        let act_space = space("action_space")?;

        let env_api_url = client.make_api_url(&format!("{instance_id}/"));
        Ok(Self {
            client,
            api_url: env_api_url,
            instance_id: instance_id.to_string(),
            obs_space,
            act_space,
        })
    }

    pub fn client_base_url(&self) -> &str {
        self.client.base_url()
    }

    pub fn name(&self) -> Result<String> {
        let obj = self.client.http_get(&self.api_url)?;

        member(&obj, "id")?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Protocol("id is not a string".to_string()))
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// The Space object corresponding to valid actions.
    /// Refer: https://gymnasium.farama.org/api/env/#gymnasium.Env.action_space
    pub fn action_space(&self) -> &ObsActSpace {
        &self.act_space
    }

    /// The Space object corresponding to valid observations.
    /// Refer: https://gymnasium.farama.org/api/env/#gymnasium.Env.observation_space
    pub fn observation_space(&self) -> &ObsActSpace {
        &self.obs_space
    }

    pub fn action_space_sample(&self) -> Result<Vec<ObsActSpaceItem>> {
        let url = self.make_api_url("action_space/sample/");
        let obj = self.client.http_get(&url)?;
        self.act_space.items_from_json(member(&obj, "action")?)
    }

    pub fn reset(&self, seed: Option<u64>) -> Result<Vec<ObsActSpaceItem>> {
        let mut body = HashMap::new();
        if let Some(seed) = seed {
            body.insert("seed", Value::from(seed));
        }

        let url = self.make_api_url("reset/");
        let obj = self.client.http_post(&url, &body)?;
        self.obs_space.items_from_json(member(&obj, "observation")?)
    }

    pub fn step(&self, action: &[ObsActSpaceItem]) -> Result<StepInfo> {
        let req = HashMap::from([("action", self.act_space.action_to_json(action)?)]);

        let url = self.make_api_url("step/");
        let obj = self.client.http_post(&url, &req)?;
        StepInfo::from_json(&self.obs_space, &obj)
    }

    pub fn close(&self) -> Result<()> {
        let url = self.make_api_url("close/");
        self.client
            .http_post(&url, &HashMap::<&str, Value>::new())
            .map(|_| ())
    }

    fn make_api_url(&self, path: &str) -> String {
        format!("{}{path}", self.api_url)
    }
}

#[derive(Debug)]
pub struct Client {
    base_url: String,
    api_url: String,
    client: reqwest::blocking::Client,
}

impl Client {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = normalize_base_url(base_url);
        let api_url = format!("{base_url}/v1/envs/");

        Ok(Self {
            base_url,
            api_url,
            client: reqwest::blocking::Client::builder().build()?,
        })
    }

    pub fn make_api_url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn http_get(&self, url: &str) -> Result<Value> {
        let res = self
            .client
            .get(url)
            .headers(Self::construct_common_headers())
            .send()?;
        Ok(res.error_for_status()?.json::<Value>()?)
    }

    fn http_post<T: Serialize>(&self, url: &str, body: &HashMap<&str, T>) -> Result<Value> {
        let res = self
            .client
            .post(url)
            .headers(Self::construct_common_headers())
            .json(body)
            .send()?;
        let res = res.error_for_status()?;

        // close/ answers with an empty body.
        let text = res.text()?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| Error::Protocol(e.to_string()))
    }

    fn construct_common_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }
}

fn normalize_base_url(base_url: &str) -> String {
    let base_url = base_url.replace("//localhost:", "//127.0.0.1:");
    base_url.trim_end_matches('/').to_string()
}

mod value_extensions {
    use super::*;

    pub fn member<'a>(obj: &'a Value, name: &str) -> Result<&'a Value> {
        obj.get(name)
            .ok_or_else(|| Error::Protocol(format!("response has no '{name}'")))
    }

    pub fn field<'a>(info: &'a Map<String, Value>, name: &str) -> Result<&'a Value> {
        info.get(name)
            .ok_or_else(|| Error::Protocol(format!("space info has no '{name}'")))
    }

    pub fn as_discrete(val: &Value) -> Result<Discrete> {
        val.as_i64()
            .map(|x| x as Discrete)
            .ok_or_else(|| Error::Protocol(format!("{val} is not an integer")))
    }

    pub fn as_continous(val: &Value) -> Result<Continous> {
        val.as_f64()
            .ok_or_else(|| Error::Protocol(format!("{val} is not a number")))
    }

    pub fn as_discrete_item_vec(val: &Value) -> Result<Vec<Discrete>> {
        val.as_array()
            .ok_or_else(|| Error::Protocol(format!("{val} is not an array")))?
            .iter()
            .map(as_discrete)
            .collect()
    }

    pub fn as_continous_item_vec(val: &Value) -> Result<Vec<Continous>> {
        val.as_array()
            .ok_or_else(|| Error::Protocol(format!("{val} is not an array")))?
            .iter()
            .map(as_continous)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::*;
    use rstest::rstest;
    use serde_json::json;

    fn box_space() -> ObsActSpace {
        ObsActSpace::Box {
            shape: vec![1],
            high: vec![1.0],
            low: vec![-1.0],
        }
    }

    #[rstest]
    #[case("http://localhost:40004/", "http://127.0.0.1:40004")]
    #[case("http://127.0.0.1:40004", "http://127.0.0.1:40004")]
    #[case("http://gym.internal:5000//", "http://gym.internal:5000")]
    fn normalizes_base_url(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_base_url(input), expected);
    }

    #[test]
    fn client_targets_envs_api() {
        let c = Client::new("http://localhost:40004/").unwrap();
        assert_eq!(c.make_api_url("abc/reset/"), "http://127.0.0.1:40004/v1/envs/abc/reset/");
    }

    #[test]
    fn parses_box_space() {
        let info = json!({"name": "Box", "shape": [2], "high": [0.6, 0.07], "low": [-1.2, -0.07]});
        let space = ObsActSpace::from_json(info.as_object().unwrap()).unwrap();

        match space {
            ObsActSpace::Box { shape, high, low } => {
                assert_eq!(shape, vec![2]);
                assert_float_eq!(high, vec![0.6, 0.07], rmax_all <= 1e-12);
                assert_float_eq!(low, vec![-1.2, -0.07], rmax_all <= 1e-12);
            }
            s => panic!("{s:?} is not a Box space"),
        }
    }

    #[test]
    fn parses_discrete_space() {
        let info = json!({"name": "Discrete", "n": 16});
        let space = ObsActSpace::from_json(info.as_object().unwrap()).unwrap();
        assert_eq!(space, ObsActSpace::Discrete { n: 16 });
    }

    #[test]
    fn rejects_unknown_space() {
        let info = json!({"name": "Tuple", "spaces": []});
        let err = ObsActSpace::from_json(info.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, Error::Protocol(m) if m.contains("Tuple")));
    }

    #[test]
    fn discrete_observation_may_be_scalar() {
        let items = ObsActSpace::Discrete { n: 16 }
            .items_from_json(&json!(5))
            .unwrap();
        assert_eq!(items, vec![ObsActSpaceItem::Discrete(5)]);
    }

    #[test]
    fn encodes_actions_per_space() {
        let a = box_space()
            .action_to_json(&[ObsActSpaceItem::Continous(0.25)])
            .unwrap();
        assert_eq!(a, json!([0.25]));

        let a = ObsActSpace::Discrete { n: 4 }
            .action_to_json(&[ObsActSpaceItem::Discrete(3)])
            .unwrap();
        assert_eq!(a, json!(3));
    }

    #[rstest]
    #[case(ObsActSpace::Discrete { n: 4 }, vec![ObsActSpaceItem::Discrete(4)])]
    #[case(ObsActSpace::Discrete { n: 4 }, vec![ObsActSpaceItem::Discrete(0), ObsActSpaceItem::Discrete(1)])]
    #[case(box_space(), vec![])]
    #[case(box_space(), vec![ObsActSpaceItem::Discrete(1)])]
    fn rejects_malformed_actions(#[case] space: ObsActSpace, #[case] action: Vec<ObsActSpaceItem>) {
        assert!(matches!(
            space.action_to_json(&action),
            Err(Error::InvalidAction(_))
        ));
    }

    #[test]
    fn parses_step_response() {
        let obj = json!({
            "observation": [0.5],
            "reward": 0.125,
            "terminated": false,
            "truncated": true,
            "info": {"harvest": 0.1}
        });

        let si = StepInfo::from_json(&box_space(), &obj).unwrap();
        assert_eq!(si.observation, vec![ObsActSpaceItem::Continous(0.5)]);
        assert_float_eq!(si.reward, 0.125, abs <= 1e-12);
        assert!(si.truncated);
        assert!(!si.terminated);
        assert_eq!(si.info["harvest"], json!(0.1));
    }

    #[test]
    fn step_response_without_flags_is_protocol_error() {
        let obj = json!({"observation": [0.5], "reward": 1.0});
        assert!(matches!(
            StepInfo::from_json(&box_space(), &obj),
            Err(Error::Protocol(_))
        ));
    }
}
