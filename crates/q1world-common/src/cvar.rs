// cvar.rs: named console variables used to configure the world renderer

use std::collections::HashMap;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct CvarFlags: u32 {
        /// saved to the config file
        const ARCHIVE = 0x01;
        /// held until get_latched_vars, applied between levels
        const LATCH   = 0x04;
    }
}

/// A console variable.
#[derive(Clone, Debug)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    pub latched_string: Option<String>,
    pub flags: CvarFlags,
    pub modified: bool,
    pub value: f32,
}

fn parse_value(s: &str) -> f32 {
    s.trim().parse::<f32>().unwrap_or(0.0)
}

/// Indexed variable store. Lookups by name go through a HashMap into
/// the dense `vars` vector so callers can also hold on to indices.
#[derive(Default)]
pub struct CvarContext {
    pub vars: Vec<Cvar>,
    index: HashMap<String, usize>,
}

impl CvarContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_var_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn find_var(&self, name: &str) -> Option<&Cvar> {
        self.index.get(name).map(|&idx| &self.vars[idx])
    }

    /// Get the floating-point value of a cvar. Returns 0 if not found.
    pub fn variable_value(&self, name: &str) -> f32 {
        self.find_var(name).map_or(0.0, |var| var.value)
    }

    /// Get or create a cvar. An existing cvar keeps its value but gains
    /// the new flags.
    pub fn get(&mut self, name: &str, value: &str, flags: CvarFlags) -> usize {
        if let Some(&idx) = self.index.get(name) {
            self.vars[idx].flags |= flags;
            return idx;
        }

        let idx = self.vars.len();
        self.vars.push(Cvar {
            name: name.to_string(),
            string: value.to_string(),
            latched_string: None,
            flags,
            modified: true,
            value: parse_value(value),
        });
        self.index.insert(name.to_string(), idx);
        idx
    }

    /// Set a cvar value. LATCH cvars hold the new value until
    /// get_latched_vars.
    pub fn set(&mut self, name: &str, value: &str) -> usize {
        let idx = match self.find_var_index(name) {
            Some(idx) => idx,
            None => return self.get(name, value, CvarFlags::empty()),
        };
        let var = &mut self.vars[idx];

        if var.flags.contains(CvarFlags::LATCH) {
            let pending = var.latched_string.as_deref().unwrap_or(&var.string);
            if pending != value {
                log::info!("{} will be changed for next map.", name);
                var.latched_string = Some(value.to_string());
            }
            return idx;
        }

        if value == var.string {
            return idx; // not changed
        }

        var.modified = true;
        var.string = value.to_string();
        var.value = parse_value(value);
        idx
    }

    /// Set a cvar from a float value.
    pub fn set_value(&mut self, name: &str, value: f32) -> usize {
        let val_str = if value == (value as i32) as f32 {
            format!("{}", value as i32)
        } else {
            format!("{}", value)
        };
        self.set(name, &val_str)
    }

    /// Apply all latched variable changes.
    pub fn get_latched_vars(&mut self) {
        for var in &mut self.vars {
            if let Some(latched) = var.latched_string.take() {
                var.value = parse_value(&latched);
                var.string = latched;
                var.modified = true;
            }
        }
    }

    /// Clear the modified flag on every cvar, returning the names that were set.
    pub fn take_modified(&mut self) -> Vec<String> {
        self.vars
            .iter_mut()
            .filter_map(|var| std::mem::take(&mut var.modified).then(|| var.name.clone()))
            .collect()
    }
}
