//! The `aegisub` table installed into every script runtime.
//!
//! Registration functions write into the session's [`RegistrationPass`];
//! everything else reads from [`HostServices`] or reports through the
//! runtime's [`ProgressRoute`]. No process-wide state is involved.

use mlua::{Function, Lua, MultiValue, Table, Value, Variadic};

use crate::feature::{Feature, FeatureInfo, FeatureKind, FilterFeature, MacroFeature};
use crate::marshal::{coerce_integer, coerce_string, entry_from_lua};
use crate::progress::{ProgressEvent, ProgressRoute};
use crate::registry::RegistrationPass;
use crate::services::HostServices;

pub const LUA_AUTOMATION_VERSION: i64 = 4;

pub(crate) struct HostContext {
    pub pass: RegistrationPass,
    pub route: ProgressRoute,
    pub services: HostServices,
}

fn runtime_error(msg: impl Into<String>) -> mlua::Error {
    mlua::Error::RuntimeError(msg.into())
}

pub(crate) fn install(lua: &Lua, ctx: HostContext) -> mlua::Result<()> {
    let aegisub = lua.create_table()?;

    // -- Registration ---------------------------------------------------------

    {
        let pass = ctx.pass.clone();
        aegisub.set(
            "register_macro",
            lua.create_function(
                move |lua, (name, description, process, validate): (Value, Value, Value, Value)| {
                    let Value::Function(process) = process else {
                        return Err(runtime_error("The macro processing function must be a function"));
                    };
                    let process = lua.create_registry_value(process)?;
                    let validate = match validate {
                        Value::Function(f) => Some(lua.create_registry_value(f)?),
                        _ => None,
                    };
                    let name = coerce_string(&name).unwrap_or_default();
                    let description = coerce_string(&description).unwrap_or_default();
                    pass.register(|index| {
                        Feature::Macro(MacroFeature::new(
                            FeatureInfo {
                                index,
                                kind: FeatureKind::Macro,
                                name,
                                description,
                                merit: None,
                                has_configuration: false,
                            },
                            process,
                            validate,
                        ))
                    })?;
                    Ok(())
                },
            )?,
        )?;
    }

    {
        let pass = ctx.pass.clone();
        aegisub.set(
            "register_filter",
            lua.create_function(
                move |lua,
                      (name, description, merit, process, config): (
                    Value,
                    Value,
                    Value,
                    Value,
                    Value,
                )| {
                    let Value::Function(process) = process else {
                        return Err(runtime_error("The filter processing function must be a function"));
                    };
                    let merit = coerce_integer(&merit)
                        .map_or(0, |m| m.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32);
                    let process = lua.create_registry_value(process)?;
                    let config = match config {
                        Value::Function(f) => Some(lua.create_registry_value(f)?),
                        _ => None,
                    };
                    let name = coerce_string(&name).unwrap_or_default();
                    let description = coerce_string(&description).unwrap_or_default();
                    let has_configuration = config.is_some();
                    pass.register(|index| {
                        Feature::Filter(FilterFeature::new(
                            FeatureInfo {
                                index,
                                kind: FeatureKind::Filter,
                                name,
                                description,
                                merit: Some(merit),
                                has_configuration,
                            },
                            process,
                            config,
                        ))
                    })?;
                    Ok(())
                },
            )?,
        )?;
    }

    // -- Measurement and video --------------------------------------------------

    {
        let metrics = ctx.services.metrics.clone();
        aegisub.set(
            "text_extents",
            lua.create_function(move |lua, (style, text): (Value, Value)| {
                if !matches!(style, Value::Table(_)) {
                    return Err(runtime_error("First argument to text_extents must be a table"));
                }
                let Some(text) = coerce_string(&text) else {
                    return Err(runtime_error("Second argument to text_extents must be a string"));
                };
                let style = match entry_from_lua(lua, style) {
                    Ok(subauto_document::Entry::Style(style)) => style,
                    _ => return Err(runtime_error("Not a style entry")),
                };
                let ext = metrics.text_extents(&style, &text).ok_or_else(|| {
                    runtime_error("Some internal error occurred calculating text_extents")
                })?;
                Ok((ext.width, ext.height, ext.descent, ext.external_leading))
            })?,
        )?;
    }

    {
        let video = ctx.services.video.clone();
        aegisub.set(
            "frame_from_ms",
            lua.create_function(move |_, ms: Value| {
                let ms = coerce_integer(&ms).unwrap_or(0);
                Ok(video.timecodes_loaded().then(|| video.frame_at_ms(ms)))
            })?,
        )?;
    }

    {
        let video = ctx.services.video.clone();
        aegisub.set(
            "ms_from_frame",
            lua.create_function(move |_, frame: Value| {
                let frame = coerce_integer(&frame).unwrap_or(0);
                Ok(video.timecodes_loaded().then(|| video.ms_at_frame(frame)))
            })?,
        )?;
    }

    {
        let video = ctx.services.video.clone();
        aegisub.set(
            "video_size",
            lua.create_function(move |_, ()| {
                Ok(match video.video_size() {
                    Some(size) => MultiValue::from_iter([
                        Value::Integer(i64::from(size.width)),
                        Value::Integer(i64::from(size.height)),
                        Value::Number(size.aspect_ratio),
                        Value::Integer(i64::from(size.aspect_ratio_type)),
                    ]),
                    None => MultiValue::from_iter([Value::Nil]),
                })
            })?,
        )?;
    }

    aegisub.set("lua_automation_version", LUA_AUTOMATION_VERSION)?;

    // -- Progress reporting -----------------------------------------------------

    let progress = lua.create_table()?;
    {
        let route = ctx.route.clone();
        progress.set(
            "set",
            lua.create_function(move |_, percent: f64| {
                route.emit(ProgressEvent::Progress(percent));
                Ok(())
            })?,
        )?;
    }
    {
        let route = ctx.route.clone();
        progress.set(
            "task",
            lua.create_function(move |_, msg: Value| {
                route.emit(ProgressEvent::Task(coerce_string(&msg).unwrap_or_default()));
                Ok(())
            })?,
        )?;
    }
    {
        let route = ctx.route.clone();
        progress.set(
            "title",
            lua.create_function(move |_, msg: Value| {
                route.emit(ProgressEvent::Title(coerce_string(&msg).unwrap_or_default()));
                Ok(())
            })?,
        )?;
    }
    {
        let route = ctx.route.clone();
        progress.set(
            "is_cancelled",
            lua.create_function(move |_, ()| Ok(route.is_cancelled()))?,
        )?;
    }
    aegisub.set("progress", progress)?;

    let debug_out = {
        let route = ctx.route.clone();
        lua.create_function(move |lua, args: Variadic<Value>| {
            let text = format_debug_args(lua, args.into_iter().collect())?;
            route.emit(ProgressEvent::Log(text));
            Ok(())
        })?
    };
    let debug = lua.create_table()?;
    debug.set("out", debug_out.clone())?;
    aegisub.set("debug", debug)?;
    aegisub.set("log", debug_out)?;

    lua.globals().set("aegisub", aegisub)?;
    Ok(())
}

/// `([level,] fmt, ...)` formatted with Lua's own `string.format`.
fn format_debug_args(lua: &Lua, mut args: Vec<Value>) -> mlua::Result<String> {
    // A leading number followed by a format string is a trace level.
    if args.len() >= 2 && matches!(args[0], Value::Integer(_) | Value::Number(_)) {
        args.remove(0);
    }
    if args.is_empty() {
        return Ok(String::new());
    }
    let string: Table = lua.globals().get("string")?;
    let format: Function = string.get("format")?;
    format.call::<String>(MultiValue::from_iter(args))
}
