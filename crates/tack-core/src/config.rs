use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow,
  bail
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

const DEFAULTS: [(&str, &str); 7] = [
  ("data.location", "~/.tack"),
  ("sync.backend", "file"),
  ("sync.timeout_ms", "10000"),
  ("gesture.long_press_ms", "500"),
  ("gesture.move_tolerance_px", "5"),
  ("calendar.week_start", "monday"),
  ("color", "on")
];

/// Flat `key = value` settings layered
/// from built-in defaults, the tackrc
/// (plus its includes) and `--rc`
/// overrides, in that order.
#[derive(Debug, Clone)]
pub struct Config {
  map:              HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    Self {
      map:          DEFAULTS
        .iter()
        .map(|(k, v)| {
          (k.to_string(), v.to_string())
        })
        .collect(),
      loaded_files: Vec::new()
    }
  }
}

/// One meaningful line of a tackrc.
#[derive(Debug, PartialEq, Eq)]
enum RcLine<'a> {
  Include(&'a str),
  Setting {
    key:   &'a str,
    value: &'a str
  }
}

fn parse_rc_line(
  raw: &str
) -> Result<Option<RcLine<'_>>, String>
{
  let line = raw
    .split_once('#')
    .map_or(raw, |(before, _)| before)
    .trim();
  if line.is_empty() {
    return Ok(None);
  }

  if let Some(target) =
    line.strip_prefix("include ")
  {
    let target = target.trim();
    if target.is_empty() {
      return Err(
        "include needs a path".to_string()
      );
    }
    return Ok(Some(RcLine::Include(
      target
    )));
  }

  match line.split_once('=') {
    | Some((key, value))
      if !key.trim().is_empty() =>
    {
      Ok(Some(RcLine::Setting {
        key:   key.trim(),
        value: value.trim()
      }))
    }
    | _ => Err(format!(
      "expected key = value, got {line:?}"
    ))
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    match locate_rc(rc_override) {
      | Some(path) => {
        info!(rc = %path.display(), "loading tackrc");
        cfg.read_rc(&path)?;
      }
      | None => {
        warn!(
          "no tackrc found; using \
           defaults"
        );
      }
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (raw_key, value) in overrides {
      let key = raw_key
        .strip_prefix("rc.")
        .map(str::to_string)
        .unwrap_or(raw_key);
      debug!(%key, %value, "override");
      self.map.insert(key, value);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self.map.get(key).map(|raw| {
      matches!(
        raw
          .trim()
          .to_ascii_lowercase()
          .as_str(),
        "1" | "y" | "yes" | "on" | "true"
      )
    })
  }

  pub fn get_u64(
    &self,
    key: &str
  ) -> anyhow::Result<Option<u64>> {
    self.parsed(key)
  }

  pub fn get_f64(
    &self,
    key: &str
  ) -> anyhow::Result<Option<f64>> {
    self.parsed(key)
  }

  fn parsed<T>(
    &self,
    key: &str
  ) -> anyhow::Result<Option<T>>
  where
    T: std::str::FromStr,
    T::Err: std::fmt::Display
  {
    let Some(raw) = self.map.get(key)
    else {
      return Ok(None);
    };
    raw
      .trim()
      .parse::<T>()
      .map(Some)
      .map_err(|err| {
        anyhow!(
          "invalid {key} value {raw:?}: \
           {err}"
        )
      })
  }

  #[tracing::instrument(skip(self))]
  fn read_rc(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    if self.loaded_files.contains(&path)
    {
      bail!(
        "{} includes itself",
        path.display()
      );
    }

    let text = fs::read_to_string(&path)
      .with_context(|| {
        format!(
          "cannot read tackrc {}",
          path.display()
        )
      })?;
    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_default();

    for (idx, raw) in
      text.lines().enumerate()
    {
      let parsed =
        parse_rc_line(raw).map_err(
          |reason| {
            anyhow!(
              "{}:{}: {reason}",
              path.display(),
              idx + 1
            )
          }
        )?;

      match parsed {
        | None => {}
        | Some(RcLine::Include(
          target
        )) => {
          let nested = expand_tilde(
            Path::new(target)
          );
          let nested =
            if nested.is_absolute() {
              nested
            } else {
              base_dir.join(nested)
            };
          if nested.exists() {
            trace!(include = %nested.display(), "following include");
            self.read_rc(&nested)?;
          } else {
            warn!(include = %nested.display(), "missing include; skipped");
          }
        }
        | Some(RcLine::Setting {
          key,
          value
        }) => {
          trace!(key, value, "rc setting");
          self.map.insert(
            key.to_string(),
            value.to_string()
          );
        }
      }
    }

    Ok(())
  }
}

/// Creates the data directory when
/// needed. `--data` beats
/// `data.location`.
#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = match override_dir {
    | Some(path) => path.to_path_buf(),
    | None => {
      let configured = cfg
        .get("data.location")
        .ok_or_else(|| {
          anyhow!(
            "data.location is not set"
          )
        })?;
      expand_tilde(Path::new(
        &configured
      ))
    }
  };

  if !dir.is_dir() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "cannot create data \
           directory {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

fn locate_rc(
  override_path: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(path.to_path_buf());
  }

  match std::env::var("TACKRC") {
    | Ok(value) if value == "/dev/null" => {
      return None;
    }
    | Ok(value) => {
      return Some(PathBuf::from(value));
    }
    | Err(_) => {}
  }

  let home = dirs::home_dir()?;
  Some(home.join(".tackrc"))
    .filter(|candidate| {
      candidate.is_file()
    })
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  match (
    path.strip_prefix("~"),
    dirs::home_dir()
  ) {
    | (Ok(rest), Some(home)) => {
      home.join(rest)
    }
    | _ => path.to_path_buf()
  }
}
