//! Lua sandbox for pipeline definitions
//!
//! Definitions come from an operator-edited manifest and are evaluated on
//! every reload, so the interpreter only gets the pure standard libraries
//! plus the `pipeline` helper module.

use mlua::{HookTriggers, Lua, LuaOptions, Result as LuaResult, StdLib, Table, VmState};
use std::sync::atomic::{AtomicU64, Ordering};

/// Instructions a single interpreter may execute before evaluation is aborted
pub const INSTRUCTION_BUDGET: u64 = 10_000_000;

const HOOK_INTERVAL: u32 = 10_000;

/// Creates an interpreter restricted to tables, strings and math
///
/// No `io`, `os`, `package` or `debug`; `require`, `dofile` and `loadfile`
/// are removed so a definition cannot reach the filesystem or load code.
/// Evaluation fails once [`INSTRUCTION_BUDGET`] instructions have run.
///
/// # Example
/// ```no_run
/// use weir_lua::sandbox::create_sandbox;
///
/// let lua = create_sandbox()?;
/// let definition: mlua::Table = lua
///     .load(r#"return pipeline.define { inputs = { pipeline.plugin("generator") } }"#)
///     .eval()?;
/// let inputs: mlua::Table = definition.get("inputs")?;
/// assert_eq!(inputs.raw_len(), 1);
/// # Ok::<(), mlua::Error>(())
/// ```
pub fn create_sandbox() -> LuaResult<Lua> {
    let lua = unsafe {
        Lua::unsafe_new_with(
            StdLib::TABLE | StdLib::STRING | StdLib::MATH,
            LuaOptions::default(),
        )
    };

    let globals = lua.globals();
    for name in ["require", "dofile", "loadfile"] {
        globals.set(name, mlua::Nil)?;
    }

    register_pipeline_module(&lua)?;
    limit_instructions(&lua, INSTRUCTION_BUDGET)?;

    Ok(lua)
}

/// Aborts execution with a runtime error after roughly `budget` instructions
fn limit_instructions(lua: &Lua, budget: u64) -> LuaResult<()> {
    let executed = AtomicU64::new(0);
    lua.set_hook(
        HookTriggers::new().every_nth_instruction(HOOK_INTERVAL),
        move |_, _| {
            let total = executed.fetch_add(u64::from(HOOK_INTERVAL), Ordering::Relaxed)
                + u64::from(HOOK_INTERVAL);
            if total > budget {
                return Err(mlua::Error::runtime(format!(
                    "instruction budget of {} exceeded",
                    budget
                )));
            }
            Ok(VmState::Continue)
        },
    )
}

/// Register the pipeline module
///
/// - `pipeline.define(definition)` returns the definition table as-is
/// - `pipeline.plugin(name, options)` returns `options` with `plugin = name` set
fn register_pipeline_module(lua: &Lua) -> LuaResult<()> {
    let pipeline = lua.create_table()?;

    let define_fn = lua.create_function(|_, definition: Table| Ok(definition))?;
    pipeline.set("define", define_fn)?;

    let plugin_fn = lua.create_function(|lua, (name, options): (String, Option<Table>)| {
        let plugin = match options {
            Some(options) => options,
            None => lua.create_table()?,
        };
        plugin.set("plugin", name)?;
        Ok(plugin)
    })?;
    pipeline.set("plugin", plugin_fn)?;

    lua.globals().set("pipeline", pipeline)?;

    Ok(())
}
