//! Conversions between host values and Lua values.
//!
//! Line numbers are zero-based on the host side and one-based in Lua. This
//! module is the only place that shifts between the two.

use std::sync::Arc;

use mlua::{
    AnyUserData, DeserializeOptions, Lua, LuaSerdeExt, MetaMethod, Table, UserData,
    UserDataMethods, Value, Variadic,
};
use parking_lot::Mutex;

use subauto_document::{Document, Entry};

use crate::error::AutomationError;

/// Selected lines plus the active line, all zero-based document indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub lines: Vec<usize>,
    pub active: Option<usize>,
}

impl Selection {
    pub fn new(lines: Vec<usize>, active: Option<usize>) -> Self {
        Self { lines, active }
    }
}

/// Build a one-based Lua array from zero-based indices.
pub fn push_integer_array(lua: &Lua, ints: &[usize]) -> mlua::Result<Table> {
    let table = lua.create_table_with_capacity(ints.len(), 0)?;
    for (i, &v) in ints.iter().enumerate() {
        table.raw_set(i + 1, v as i64 + 1)?;
    }
    Ok(table)
}

/// Read a script-returned selection back as zero-based indices.
///
/// `None` when the value is not a table. Elements `1..=#t` are visited in
/// order; anything that is not numeric or is below 1 is skipped.
pub fn read_selection_array(value: &Value) -> Option<Vec<usize>> {
    let Value::Table(table) = value else {
        return None;
    };

    let len = table.raw_len();
    let mut out = Vec::with_capacity(len);
    for i in 1..=len {
        let Ok(v) = table.raw_get::<Value>(i) else { continue };
        if let Some(n) = coerce_integer(&v) {
            if n >= 1 {
                out.push((n - 1) as usize);
            }
        }
    }
    Some(out)
}

/// Active line as a script sees it: one-based, or -1 for none.
pub fn push_active_line(active: Option<usize>) -> Value {
    match active {
        Some(i) => Value::Integer(i as i64 + 1),
        None => Value::Integer(-1),
    }
}

/// A global as text. Empty if unset or not a string or number.
pub fn read_global_string(lua: &Lua, name: &str) -> String {
    match lua.globals().raw_get::<Value>(name) {
        Ok(v) => coerce_string(&v).unwrap_or_default(),
        Err(_) => String::new(),
    }
}

/// Lua's string coercion: strings as-is, numbers formatted.
pub fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.to_string_lossy().to_string()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Number(n) => Some(format_number(*n)),
        _ => None,
    }
}

/// Lua's integer coercion: integers, truncated floats and numeric strings.
pub fn coerce_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(*i),
        Value::Number(n) if n.is_finite() => Some(n.trunc() as i64),
        Value::String(s) => {
            let text = s.to_str().ok()?;
            let text = text.trim();
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().filter(|n| n.is_finite()).map(|n| n.trunc() as i64))
        }
        _ => None,
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{:.1}", n)
    } else {
        format!("{}", n)
    }
}

/// Truthiness the way Lua sees it.
pub fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Nil | Value::Boolean(false))
}

pub fn entry_to_lua(lua: &Lua, entry: &Entry) -> mlua::Result<Value> {
    lua.to_value(entry)
}

pub fn entry_from_lua(lua: &Lua, value: Value) -> mlua::Result<Entry> {
    if !matches!(value, Value::Table(_)) {
        return Err(mlua::Error::RuntimeError(
            "subtitle line must be a table".to_string(),
        ));
    }
    let options = DeserializeOptions::new().deny_unsupported_types(false);
    lua.from_value_with(value, options)
}

// =============================================================================
// Document snapshot
// =============================================================================

struct SnapshotState {
    entries: Vec<Entry>,
    live: bool,
    modified: bool,
    allow_modify: bool,
    allow_undo: bool,
}

impl SnapshotState {
    fn check_live(&self) -> mlua::Result<()> {
        if self.live {
            Ok(())
        } else {
            Err(AutomationError::StaleHandle.into())
        }
    }

    fn check_writable(&self) -> mlua::Result<()> {
        self.check_live()?;
        if self.allow_modify {
            Ok(())
        } else {
            Err(AutomationError::ReadOnly.into())
        }
    }

    fn line_index(&self, n: i64) -> mlua::Result<usize> {
        if n >= 1 && (n as usize) <= self.entries.len() {
            Ok(n as usize - 1)
        } else {
            Err(mlua::Error::RuntimeError(format!(
                "Requested out-of-range line from subtitle file: {}",
                n
            )))
        }
    }
}

/// The host document as a script sees it for one invocation.
///
/// Scripts edit a private copy of the entries. When the invocation ends,
/// [`complete`](Self::complete) commits the copy (if writes were allowed and
/// anything changed) and turns every outstanding Lua handle stale.
#[derive(Clone)]
pub struct DocumentSnapshot {
    state: Arc<Mutex<SnapshotState>>,
}

impl DocumentSnapshot {
    pub fn new(document: &Document, allow_modify: bool, allow_undo: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(SnapshotState {
                entries: document.entries().to_vec(),
                live: true,
                modified: false,
                allow_modify,
                allow_undo,
            })),
        }
    }

    /// For validators and config dialogs.
    pub fn read_only(document: &Document) -> Self {
        Self::new(document, false, false)
    }

    /// For macros: writable, committed as one undo step.
    pub fn for_macro(document: &Document) -> Self {
        Self::new(document, true, true)
    }

    /// For export filters: writable, never recorded in history.
    pub fn for_export(document: &Document) -> Self {
        Self::new(document, true, false)
    }

    pub fn allows_undo(&self) -> bool {
        self.state.lock().allow_undo
    }

    pub fn is_live(&self) -> bool {
        self.state.lock().live
    }

    /// Wrap as a Lua value.
    pub fn push(&self, lua: &Lua) -> mlua::Result<AnyUserData> {
        lua.create_userdata(SubtitlesHandle { state: self.state.clone() })
    }

    /// End of processing. Returns true if the document was changed.
    pub fn complete(&self, document: &mut Document, description: &str) -> bool {
        let mut state = self.state.lock();
        state.live = false;
        if !(state.allow_modify && state.modified) {
            return false;
        }
        let entries = std::mem::take(&mut state.entries);
        let undo = if state.allow_undo { Some(description) } else { None };
        drop(state);

        if entries == document.entries() {
            return false;
        }
        document.commit(entries, undo);
        true
    }

    /// End of a read-only use. Outstanding handles turn stale.
    pub fn release(&self) {
        self.state.lock().live = false;
    }
}

// =============================================================================
// Lua side
// =============================================================================

struct SubtitlesHandle {
    state: Arc<Mutex<SnapshotState>>,
}

impl UserData for SubtitlesHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Len, |_, this, ()| {
            let state = this.state.lock();
            state.check_live()?;
            Ok(state.entries.len())
        });

        methods.add_meta_method(MetaMethod::Index, |lua, this, key: Value| {
            match &key {
                Value::String(s) => {
                    let name = s.to_str()?.to_string();
                    match name.as_str() {
                        "n" => {
                            let state = this.state.lock();
                            state.check_live()?;
                            Ok(Value::Integer(state.entries.len() as i64))
                        }
                        "append" => bind_method(lua, &this.state, append),
                        "insert" => bind_method(lua, &this.state, insert),
                        "delete" => bind_method(lua, &this.state, delete),
                        "deleterange" => bind_method(lua, &this.state, delete_range),
                        _ => Ok(Value::Nil),
                    }
                }
                _ => {
                    let Some(n) = coerce_integer(&key) else {
                        return Ok(Value::Nil);
                    };
                    let entry = {
                        let state = this.state.lock();
                        state.check_live()?;
                        let i = state.line_index(n)?;
                        state.entries[i].clone()
                    };
                    entry_to_lua(lua, &entry)
                }
            }
        });

        methods.add_meta_method(MetaMethod::NewIndex, |lua, this, (key, value): (Value, Value)| {
            let n = coerce_integer(&key).ok_or_else(|| {
                mlua::Error::RuntimeError("Attempt to set a non-numeric index in a subtitle array".to_string())
            })?;
            let entry = match value {
                Value::Nil => None,
                other => Some(entry_from_lua(lua, other)?),
            };

            let mut state = this.state.lock();
            state.check_writable()?;
            match (n, entry) {
                (0, Some(entry)) => state.entries.push(entry),
                (0, None) => {}
                (n, Some(entry)) if n > 0 => {
                    let i = state.line_index(n)?;
                    state.entries[i] = entry;
                }
                (n, Some(entry)) => {
                    // Negative index inserts before line |n|.
                    let i = state.line_index(n.saturating_neg())?;
                    state.entries.insert(i, entry);
                }
                (n, None) => {
                    let i = state.line_index(n.saturating_abs())?;
                    state.entries.remove(i);
                }
            }
            state.modified = true;
            Ok(())
        });
    }
}

type HandleOp = fn(&Lua, &mut SnapshotState, Vec<Value>) -> mlua::Result<()>;

/// Create a function bound to the snapshot that works with both `subs.f(...)`
/// and `subs:f(...)`.
fn bind_method(lua: &Lua, state: &Arc<Mutex<SnapshotState>>, op: HandleOp) -> mlua::Result<Value> {
    let state = state.clone();
    let f = lua.create_function(move |lua, args: Variadic<Value>| {
        let mut args: Vec<Value> = args.into_iter().collect();
        if matches!(args.first(), Some(Value::UserData(_))) {
            args.remove(0);
        }
        let mut guard = state.lock();
        guard.check_writable()?;
        op(lua, &mut guard, args)?;
        guard.modified = true;
        Ok(())
    })?;
    Ok(Value::Function(f))
}

fn append(lua: &Lua, state: &mut SnapshotState, args: Vec<Value>) -> mlua::Result<()> {
    for v in args {
        state.entries.push(entry_from_lua(lua, v)?);
    }
    Ok(())
}

fn insert(lua: &Lua, state: &mut SnapshotState, args: Vec<Value>) -> mlua::Result<()> {
    let mut args = args.into_iter();
    let n = args.next().as_ref().and_then(coerce_integer).ok_or_else(|| {
        mlua::Error::RuntimeError("insert: first argument must be a line number".to_string())
    })?;
    // Inserting at #subs+1 appends.
    let mut at = if n as usize == state.entries.len() + 1 { state.entries.len() } else { state.line_index(n)? };
    for v in args {
        let entry = entry_from_lua(lua, v)?;
        state.entries.insert(at, entry);
        at += 1;
    }
    Ok(())
}

fn delete(_lua: &Lua, state: &mut SnapshotState, args: Vec<Value>) -> mlua::Result<()> {
    let mut indices = Vec::new();
    for v in &args {
        match v {
            Value::Table(t) => {
                for item in t.clone().sequence_values::<Value>() {
                    if let Some(n) = coerce_integer(&item?) {
                        indices.push(state.line_index(n)?);
                    }
                }
            }
            other => {
                if let Some(n) = coerce_integer(other) {
                    indices.push(state.line_index(n)?);
                }
            }
        }
    }
    indices.sort_unstable();
    indices.dedup();
    for i in indices.into_iter().rev() {
        state.entries.remove(i);
    }
    Ok(())
}

fn delete_range(_lua: &Lua, state: &mut SnapshotState, args: Vec<Value>) -> mlua::Result<()> {
    let first = args.first().and_then(coerce_integer);
    let last = args.get(1).and_then(coerce_integer);
    let (Some(first), Some(last)) = (first, last) else {
        return Err(mlua::Error::RuntimeError(
            "deleterange: expected two line numbers".to_string(),
        ));
    };
    if first > last {
        return Ok(());
    }
    let a = state.line_index(first)?;
    let b = state.line_index(last)?;
    state.entries.drain(a..=b);
    Ok(())
}
