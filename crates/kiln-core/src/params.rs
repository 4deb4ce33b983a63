//! Named-parameter rendering for build steps and checks.
//!
//! Templates use `{{name}}` placeholders. Dependency install paths are exposed
//! as `{{deps.<name>}}` and auxiliary resources as `{{resources.<name>}}`.

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamError {
    #[error("Unknown parameter '{{{{{name}}}}}' in \"{template}\"")]
    UnknownParameter { name: String, template: String },
}

/// Parameter set for one package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: BTreeMap<String, String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn set_path(&mut self, key: impl Into<String>, path: &Path) -> &mut Self {
        self.set(key, path.to_string_lossy())
    }

    pub fn set_dep(&mut self, dep: &str, path: &Path) -> &mut Self {
        self.set_path(format!("deps.{dep}"), path)
    }

    pub fn set_resource(&mut self, resource: &str, path: &Path) -> &mut Self {
        self.set_path(format!("resources.{resource}"), path)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Substitute every placeholder in `template`.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError::UnknownParameter`] naming the first placeholder
    /// with no value.
    pub fn render(&self, template: &str) -> Result<String, ParamError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            let Some(len) = rest[start + 2..].find("}}") else {
                break;
            };
            let name = rest[start + 2..start + 2 + len].trim();
            let end = start + 2 + len + 2;

            if is_param_name(name) {
                let value = self
                    .values
                    .get(name)
                    .ok_or_else(|| ParamError::UnknownParameter {
                        name: name.to_string(),
                        template: template.to_string(),
                    })?;
                out.push_str(&rest[..start]);
                out.push_str(value);
            } else {
                out.push_str(&rest[..end]);
            }
            rest = &rest[end..];
        }

        out.push_str(rest);
        Ok(out)
    }

    pub fn render_all(&self, templates: &[String]) -> Result<Vec<String>, ParamError> {
        templates.iter().map(|t| self.render(t)).collect()
    }

    pub fn render_map(
        &self,
        templates: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>, ParamError> {
        templates
            .iter()
            .map(|(k, v)| Ok((k.clone(), self.render(v)?)))
            .collect()
    }
}

fn is_param_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '+'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Params {
        let mut p = Params::new();
        p.set("prefix", "/kiln/cellar/openems/0.0.37")
            .set("jobs", "8")
            .set_dep("csxcad", Path::new("/kiln/cellar/csxcad/0.6.4"))
            .set_resource("tinyxml", Path::new("/work/resources/tinyxml"));
        p
    }

    #[test]
    fn renders_known_placeholders() {
        let p = params();
        assert_eq!(
            p.render("-DCMAKE_INSTALL_PREFIX={{prefix}}").unwrap(),
            "-DCMAKE_INSTALL_PREFIX=/kiln/cellar/openems/0.0.37"
        );
        assert_eq!(
            p.render("{{ deps.csxcad }}/lib:{{resources.tinyxml}}").unwrap(),
            "/kiln/cellar/csxcad/0.6.4/lib:/work/resources/tinyxml"
        );
        assert_eq!(p.render("--parallel {{jobs}}").unwrap(), "--parallel 8");
    }

    #[test]
    fn leaves_plain_text_alone() {
        let p = params();
        assert_eq!(p.render("no placeholders").unwrap(), "no placeholders");
        assert_eq!(p.render("${HOME} {single}").unwrap(), "${HOME} {single}");
    }

    #[test]
    fn unknown_placeholder_is_an_error() {
        let err = params().render("{{deps.vtk}}/lib/cmake").unwrap_err();
        assert_eq!(
            err,
            ParamError::UnknownParameter {
                name: "deps.vtk".to_string(),
                template: "{{deps.vtk}}/lib/cmake".to_string(),
            }
        );
        assert!(err.to_string().contains("{{deps.vtk}}"));
    }

    #[test]
    fn render_map_renders_values_only() {
        let mut env = BTreeMap::new();
        env.insert("CSXCAD_ROOT".to_string(), "{{deps.csxcad}}".to_string());
        let rendered = params().render_map(&env).unwrap();
        assert_eq!(rendered["CSXCAD_ROOT"], "/kiln/cellar/csxcad/0.6.4");
    }
}
