//! Filter configuration dialogs.
//!
//! A filter's config function returns an array of control tables. The host
//! presents them (or, headless, applies `name=value` overrides) and
//! [`ConfigDialog::read_back`] turns the result into the single options table
//! the filter's process function receives.

use std::collections::HashMap;

use mlua::{DeserializeOptions, Lua, LuaSerdeExt, Table, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlClass {
    Label,
    Edit,
    Textbox,
    IntEdit,
    FloatEdit,
    Checkbox,
    Dropdown,
    Color,
}

impl ControlClass {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "label" => Some(Self::Label),
            "edit" => Some(Self::Edit),
            "textbox" => Some(Self::Textbox),
            "intedit" => Some(Self::IntEdit),
            "floatedit" => Some(Self::FloatEdit),
            "checkbox" => Some(Self::Checkbox),
            "dropdown" => Some(Self::Dropdown),
            "color" | "coloralpha" | "alpha" => Some(Self::Color),
            _ => None,
        }
    }
}

/// A control's value. Lua numbers and strings keep their Lua shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Raw control table as a script writes it.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawControl {
    class: String,
    name: String,
    x: i64,
    y: i64,
    width: i64,
    height: i64,
    label: String,
    hint: String,
    value: Option<ControlValue>,
    text: Option<String>,
    items: Vec<String>,
    min: Option<f64>,
    max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DialogControl {
    pub class: ControlClass,
    pub name: String,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    pub label: String,
    pub hint: String,
    pub value: Option<ControlValue>,
    pub items: Vec<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl DialogControl {
    fn from_raw(raw: RawControl) -> Option<Self> {
        let class = ControlClass::from_name(&raw.class)?;
        let value = raw.value.or(raw.text.map(ControlValue::Text));
        Some(Self {
            class,
            name: raw.name,
            x: raw.x,
            y: raw.y,
            width: raw.width.max(1),
            height: raw.height.max(1),
            label: raw.label,
            hint: raw.hint,
            value,
            items: raw.items,
            min: raw.min,
            max: raw.max,
        })
    }

    /// Labels are decoration; everything else with a name reports a value.
    pub fn has_value(&self) -> bool {
        self.class != ControlClass::Label && !self.name.is_empty()
    }

    /// The value this control reports, coerced to its class.
    pub fn current_value(&self) -> ControlValue {
        match self.class {
            ControlClass::Checkbox => ControlValue::Bool(match &self.value {
                Some(ControlValue::Bool(b)) => *b,
                Some(ControlValue::Int(i)) => *i != 0,
                Some(ControlValue::Text(s)) => parse_bool(s).unwrap_or(false),
                _ => false,
            }),
            ControlClass::IntEdit => ControlValue::Int(match &self.value {
                Some(ControlValue::Int(i)) => *i,
                Some(ControlValue::Float(f)) => f.trunc() as i64,
                Some(ControlValue::Text(s)) => s.trim().parse().unwrap_or(0),
                _ => 0,
            }),
            ControlClass::FloatEdit => ControlValue::Float(match &self.value {
                Some(ControlValue::Float(f)) => *f,
                Some(ControlValue::Int(i)) => *i as f64,
                Some(ControlValue::Text(s)) => s.trim().parse().unwrap_or(0.0),
                _ => 0.0,
            }),
            _ => ControlValue::Text(match &self.value {
                Some(ControlValue::Text(s)) => s.clone(),
                Some(ControlValue::Int(i)) => i.to_string(),
                Some(ControlValue::Float(f)) => f.to_string(),
                Some(ControlValue::Bool(b)) => b.to_string(),
                None => String::new(),
            }),
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfigDialog {
    controls: Vec<DialogControl>,
    overrides: HashMap<String, ControlValue>,
}

impl ConfigDialog {
    /// Build from whatever the config function returned. Anything that is
    /// not a control table is skipped.
    pub fn from_lua(lua: &Lua, value: Value) -> Self {
        let Value::Table(table) = value else {
            return Self::default();
        };

        let mut controls = Vec::new();
        for pair in table.pairs::<Value, Value>() {
            let Ok((_, control)) = pair else { continue };
            if !matches!(control, Value::Table(_)) {
                continue;
            }
            let options = DeserializeOptions::new().deny_unsupported_types(false);
            match lua.from_value_with::<RawControl>(control, options) {
                Ok(raw) => match DialogControl::from_raw(raw) {
                    Some(c) => controls.push(c),
                    None => log::debug!("skipping dialog control with unknown class"),
                },
                Err(e) => log::debug!("skipping malformed dialog control: {}", e),
            }
        }
        controls.sort_by(|a, b| (a.y, a.x).cmp(&(b.y, b.x)));

        Self { controls, overrides: HashMap::new() }
    }

    pub fn controls(&self) -> &[DialogControl] {
        &self.controls
    }

    pub fn control(&self, name: &str) -> Option<&DialogControl> {
        self.controls.iter().find(|c| c.has_value() && c.name == name)
    }

    /// Override a control's value from text, the way a user would type it.
    pub fn set_value(&mut self, name: &str, raw: &str) -> Result<(), String> {
        let control = self
            .control(name)
            .ok_or_else(|| format!("no dialog control named '{}'", name))?;

        let value = match control.class {
            ControlClass::Checkbox => ControlValue::Bool(
                parse_bool(raw).ok_or_else(|| format!("'{}' expects true or false, got '{}'", name, raw))?,
            ),
            ControlClass::IntEdit => {
                let v: i64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| format!("'{}' expects an integer, got '{}'", name, raw))?;
                ControlValue::Int(clamp(v as f64, control.min, control.max) as i64)
            }
            ControlClass::FloatEdit => {
                let v: f64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| format!("'{}' expects a number, got '{}'", name, raw))?;
                ControlValue::Float(clamp(v, control.min, control.max))
            }
            ControlClass::Dropdown if !control.items.is_empty() && !control.items.iter().any(|i| i == raw) => {
                return Err(format!(
                    "'{}' must be one of: {}",
                    name,
                    control.items.join(", ")
                ));
            }
            _ => ControlValue::Text(raw.to_string()),
        };

        self.overrides.insert(name.to_string(), value);
        Ok(())
    }

    /// Current values by control name.
    pub fn values(&self) -> Vec<(String, ControlValue)> {
        self.controls
            .iter()
            .filter(|c| c.has_value())
            .map(|c| {
                let value = self
                    .overrides
                    .get(&c.name)
                    .cloned()
                    .unwrap_or_else(|| c.current_value());
                (c.name.clone(), value)
            })
            .collect()
    }

    /// Push the dialog's result: exactly one table of name -> value.
    pub fn read_back(&self, lua: &Lua) -> mlua::Result<Table> {
        let table = lua.create_table()?;
        for (name, value) in self.values() {
            let v = match value {
                ControlValue::Bool(b) => Value::Boolean(b),
                ControlValue::Int(i) => Value::Integer(i),
                ControlValue::Float(f) => Value::Number(f),
                ControlValue::Text(s) => Value::String(lua.create_string(&s)?),
            };
            table.set(name, v)?;
        }
        Ok(table)
    }
}

fn clamp(v: f64, min: Option<f64>, max: Option<f64>) -> f64 {
    let v = min.map_or(v, |m| v.max(m));
    max.map_or(v, |m| v.min(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialog(lua: &Lua) -> ConfigDialog {
        let value: Value = lua
            .load(
                r#"return {
                    { class = "label", label = "Shift by", x = 0, y = 0 },
                    { class = "intedit", name = "shift", value = 100, min = 0, max = 500, x = 1, y = 0 },
                    { class = "checkbox", name = "comments", label = "Include comments", value = true, y = 1 },
                    { class = "dropdown", name = "mode", items = { "start", "end" }, value = "start", y = 2 },
                    { class = "edit", name = "tag", text = "x", y = 3 },
                    { class = "bogus", name = "ignored" },
                    "not a control",
                }"#,
            )
            .eval()
            .unwrap();
        ConfigDialog::from_lua(lua, value)
    }

    #[test]
    fn test_malformed_controls_skipped() {
        let lua = Lua::new();
        let d = dialog(&lua);
        assert_eq!(d.controls().len(), 5);
        assert_eq!(d.controls()[0].class, ControlClass::Label);
    }

    #[test]
    fn test_read_back_defaults() {
        let lua = Lua::new();
        let d = dialog(&lua);
        let t = d.read_back(&lua).unwrap();
        assert_eq!(t.get::<i64>("shift").unwrap(), 100);
        assert!(t.get::<bool>("comments").unwrap());
        assert_eq!(t.get::<String>("mode").unwrap(), "start");
        assert_eq!(t.get::<String>("tag").unwrap(), "x");
    }

    #[test]
    fn test_overrides() {
        let lua = Lua::new();
        let mut d = dialog(&lua);
        d.set_value("shift", "900").unwrap();
        d.set_value("comments", "no").unwrap();
        d.set_value("mode", "end").unwrap();
        assert!(d.set_value("mode", "middle").is_err());
        assert!(d.set_value("shift", "abc").is_err());
        assert!(d.set_value("nothing", "1").is_err());

        let t = d.read_back(&lua).unwrap();
        assert_eq!(t.get::<i64>("shift").unwrap(), 500);
        assert!(!t.get::<bool>("comments").unwrap());
        assert_eq!(t.get::<String>("mode").unwrap(), "end");
    }

    #[test]
    fn test_non_table_result_is_empty() {
        let lua = Lua::new();
        let d = ConfigDialog::from_lua(&lua, Value::Integer(3));
        assert!(d.controls().is_empty());
        assert_eq!(d.read_back(&lua).unwrap().pairs::<Value, Value>().count(), 0);
    }
}
