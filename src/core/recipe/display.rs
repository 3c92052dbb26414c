use super::{HandleId, ParticleId, Recipe, SlotConnectionId, SlotId};
use crate::core::hasher;
use std::fmt::{self, Write};

/// Knobs for [`Recipe::to_string_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ToStringOptions {
    /// Annotate entities that keep the recipe from being resolved.
    pub show_unresolved: bool,
}

impl Recipe {
    /// Content digest of the canonical text. Equal for structurally equal
    /// normalized recipes.
    pub fn digest(&self) -> String {
        hasher::hash_string(&self.to_string())
    }

    pub fn to_string_with(&self, options: ToStringOptions) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_text(&mut out, options);
        out
    }

    fn handle_name(&self, h: HandleId) -> String {
        self.handles[h.0]
            .local_name
            .clone()
            .unwrap_or_else(|| format!("handle{}", h.0))
    }

    fn particle_label(&self, p: ParticleId) -> String {
        self.particles[p.0]
            .local_name
            .clone()
            .unwrap_or_else(|| format!("particle{}", p.0))
    }

    fn slot_name(&self, s: SlotId) -> String {
        self.slots[s.0]
            .local_name
            .clone()
            .unwrap_or_else(|| format!("slot{}", s.0))
    }

    fn write_text(&self, out: &mut String, options: ToStringOptions) -> fmt::Result {
        writeln!(out, "recipe")?;
        if let Some(search) = &self.search {
            writeln!(out, "  search `{}`", search.phrase())?;
            write!(out, "    tokens")?;
            for t in search.unresolved_tokens() {
                write!(out, " `{}`", t)?;
            }
            if !search.resolved_tokens().is_empty() {
                write!(out, " //")?;
                for t in search.resolved_tokens() {
                    write!(out, " `{}`", t)?;
                }
            }
            writeln!(out)?;
        }
        for c in &self.constraints {
            writeln!(
                out,
                "  {}.{} {} {}.{}",
                c.from.name,
                c.from_connection,
                c.direction.arrow(),
                c.to.name,
                c.to_connection
            )?;
        }
        for h in self.handle_ids() {
            self.write_handle(out, h, options)?;
        }
        for s in self.slot_ids() {
            let slot = &self.slots[s.0];
            if slot.source_connection.is_some() {
                continue;
            }
            write!(out, "  slot")?;
            if let Some(id) = &slot.id {
                write!(out, " '{}'", id)?;
            }
            write!(out, " as {}", self.slot_name(s))?;
            for tag in &slot.tags {
                write!(out, " #{}", tag)?;
            }
            writeln!(out)?;
        }
        for p in self.particle_ids() {
            self.write_particle(out, p, options)?;
        }
        if options.show_unresolved {
            if !self.constraints.is_empty() {
                writeln!(out, "  // unresolved: {} connection constraint(s)", self.constraints.len())?;
            }
            if let Some(search) = &self.search {
                if !search.is_resolved() {
                    writeln!(out, "  // unresolved search tokens")?;
                }
            }
        }
        Ok(())
    }

    fn write_handle(&self, out: &mut String, h: HandleId, options: ToStringOptions) -> fmt::Result {
        let handle = &self.handles[h.0];
        write!(out, "  {}", handle.fate)?;
        if let Some(id) = &handle.id {
            write!(out, " '{}'", id)?;
        }
        write!(out, " as {}", self.handle_name(h))?;
        for tag in &handle.tags {
            write!(out, " #{}", tag)?;
        }
        if let Some(ty) = handle.ty() {
            write!(out, " // {}", ty.display(&self.type_vars))?;
        }
        if options.show_unresolved && !self.is_handle_resolved(h) {
            write!(out, " // unresolved handle")?;
        }
        writeln!(out)
    }

    fn write_particle(&self, out: &mut String, p: ParticleId, options: ToStringOptions) -> fmt::Result {
        let particle = &self.particles[p.0];
        match (&particle.name, particle.verbs.first()) {
            (Some(name), _) => write!(out, "  {}", name)?,
            (None, Some(verb)) => write!(out, "  &{}", verb)?,
            (None, None) => write!(out, "  particle")?,
        }
        write!(out, " as {}", self.particle_label(p))?;
        if options.show_unresolved && !self.is_particle_resolved(p) {
            write!(out, " // unresolved particle")?;
        }
        writeln!(out)?;

        for c in particle.all_connections() {
            let conn = &self.connections[c.0];
            write!(
                out,
                "    {} {}",
                conn.name.as_deref().unwrap_or("*"),
                conn.direction.map_or("=", |d| d.arrow())
            )?;
            if let Some(h) = conn.handle {
                write!(out, " {}", self.handle_name(h))?;
            }
            for tag in &conn.tags {
                write!(out, " #{}", tag)?;
            }
            if options.show_unresolved && !self.is_connection_resolved(c) {
                write!(out, " // unresolved connection")?;
            }
            writeln!(out)?;
        }
        for sc in particle.consumed_slots.values() {
            self.write_slot_connection(out, *sc)?;
        }
        Ok(())
    }

    fn write_slot_connection(&self, out: &mut String, sc: SlotConnectionId) -> fmt::Result {
        let conn = &self.slot_connections[sc.0];
        write!(out, "    consume {}", conn.name)?;
        if let Some(s) = conn.target_slot {
            write!(out, " as {}", self.slot_name(s))?;
        }
        writeln!(out)?;
        for (name, s) in &conn.provided_slots {
            writeln!(out, "      provide {} as {}", name, self.slot_name(*s))?;
        }
        Ok(())
    }
}

impl fmt::Display for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_with(ToStringOptions::default()))
    }
}
