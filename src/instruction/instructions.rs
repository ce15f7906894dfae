use std::fmt;

use super::{Instruction, InstructionResult};
use crate::header::{Attrs, Parameters};

/// An ordered instruction header: each instruction with its attribute overlay.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Instructions {
    entries: Vec<(Instruction, Attrs)>,
}

impl Instructions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(header: &str) -> InstructionResult<Self> {
        Self::from_parameters(&Parameters::parse(header)?)
    }

    pub fn from_parameters(parameters: &Parameters) -> InstructionResult<Self> {
        let mut instructions = Instructions::new();
        for (name, attrs) in parameters.iter() {
            instructions.push(Instruction::new(name)?, attrs.clone());
        }
        Ok(instructions)
    }

    pub fn push(&mut self, instruction: Instruction, attrs: Attrs) {
        self.entries.push((instruction, attrs));
    }

    /// Appends an instruction unless one with the same text exists.
    pub fn append_if_absent(&mut self, instruction: Instruction, attrs: Attrs) {
        if !self.entries.iter().any(|(i, _)| *i == instruction) {
            self.entries.push((instruction, attrs));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Instruction, &Attrs)> {
        self.entries.iter().map(|(i, a)| (i, a))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The first instruction matching `name`, negated or not.
    pub fn matcher(&self, name: &str) -> Option<(&Instruction, &Attrs)> {
        self.iter().find(|(instruction, _)| instruction.matches(name))
    }

    /// True if the first match for `name` selects it.
    pub fn selects(&self, name: &str) -> bool {
        matches!(self.matcher(name), Some((instruction, _)) if !instruction.is_negated())
    }

    /// Names selected by their first matching instruction, in input order.
    pub fn select<'a, I>(&self, names: I) -> Vec<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names.into_iter().filter(|name| self.selects(name)).collect()
    }

    /// Decorates `target` in place and returns the instructions that matched nothing.
    ///
    /// Each entry takes the overlay of its first matching instruction, or is
    /// removed when that instruction is negated. Overlay attributes never
    /// replace attributes the entry already has. Overlay directives do,
    /// unless written `~key:`. A `!key` overlay removes `key`. With
    /// `add_literals`, unmatched literal instructions are added as entries.
    pub fn decorate(&self, target: &mut Parameters, add_literals: bool) -> Vec<&Instruction> {
        let mut used = vec![false; self.entries.len()];
        let mut decorated = Parameters::new();
        for (name, attrs) in target.iter() {
            let mut attrs = attrs.clone();
            let candidate = crate::header::strip_duplicate_marker(name);
            match self
                .entries
                .iter()
                .position(|(instruction, _)| instruction.matches(candidate))
            {
                Some(index) => {
                    used[index] = true;
                    let (instruction, overlay) = &self.entries[index];
                    if instruction.is_negated() {
                        continue;
                    }
                    apply_overlay(&mut attrs, overlay);
                    decorated.insert(candidate, attrs);
                }
                None => decorated.insert(candidate, attrs),
            }
        }

        if add_literals {
            for (index, (instruction, overlay)) in self.entries.iter().enumerate() {
                if used[index] || instruction.is_negated() {
                    continue;
                }
                if let Some(name) = instruction.literal() {
                    used[index] = true;
                    let mut attrs = Attrs::new();
                    apply_overlay(&mut attrs, overlay);
                    decorated.insert(name, attrs);
                }
            }
        }

        *target = decorated;
        self.entries
            .iter()
            .zip(used)
            .filter(|(_, used)| !used)
            .map(|((instruction, _), _)| instruction)
            .collect()
    }
}

/// Merges an instruction's overlay into an entry's attributes.
pub(crate) fn apply_overlay(attrs: &mut Attrs, overlay: &Attrs) {
    for (key, value) in overlay.iter() {
        if let Some(removed) = key.strip_prefix('!') {
            attrs.remove(removed);
        } else if let Some(merge_only) = key.strip_prefix('~') {
            if !attrs.contains_key(merge_only) {
                attrs.put(merge_only, value);
            }
        } else if Attrs::is_directive(key) || !attrs.contains_key(key) {
            attrs.put(key, value);
        }
    }
}

impl fmt::Display for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (instruction, attrs)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", instruction)?;
            if !attrs.is_empty() {
                write!(f, ";{}", attrs)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn names(p: &Parameters) -> Vec<&str> {
        p.keys().collect()
    }

    #[test]
    fn test_first_match_wins() {
        let instructions = Instructions::parse("A;x=1, *;x=0").unwrap();
        let mut target = Parameters::parse("abc, A, ghi").unwrap();
        let unused = instructions.decorate(&mut target, false);

        assert!(unused.is_empty());
        assert_eq!(target.get("A").unwrap().get("x"), Some("1"));
        assert_eq!(target.get("abc").unwrap().get("x"), Some("0"));
        assert_eq!(target.get("ghi").unwrap().get("x"), Some("0"));
    }

    #[test]
    fn test_negation_removes_before_wildcard() {
        let instructions = Instructions::parse("!B, *").unwrap();
        let mut target = Parameters::parse("A, B, C").unwrap();
        instructions.decorate(&mut target, false);
        assert_eq!(names(&target), vec!["A", "C"]);
    }

    #[test]
    fn test_existing_attributes_win() {
        let instructions = Instructions::parse("*;version=2;resolution:=optional").unwrap();
        let mut target = Parameters::parse("a;version=1;resolution:=mandatory").unwrap();
        instructions.decorate(&mut target, false);
        let a = target.get("a").unwrap();
        assert_eq!(a.version(), Some("1"));
        assert_eq!(a.get("resolution:"), Some("optional"));
    }

    #[test]
    fn test_merge_only_and_removal_keys() {
        let instructions = Instructions::parse("*;~resolution:=optional;!x=").unwrap();
        let mut target = Parameters::parse("a;resolution:=mandatory;x=1, b").unwrap();
        instructions.decorate(&mut target, false);
        let a = target.get("a").unwrap();
        assert_eq!(a.get("resolution:"), Some("mandatory"));
        assert!(!a.contains_key("x"));
        assert_eq!(target.get("b").unwrap().get("resolution:"), Some("optional"));
    }

    #[test]
    fn test_literals_added_and_unused_reported() {
        let instructions = Instructions::parse("com.bar;v=1, baz.*, !gone, *").unwrap();
        let mut target = Parameters::parse("com.foo").unwrap();

        let unused: Vec<String> = instructions
            .decorate(&mut target, true)
            .into_iter()
            .map(|i| i.to_string())
            .collect();

        assert_eq!(names(&target), vec!["com.foo", "com.bar"]);
        assert_eq!(target.get("com.bar").unwrap().get("v"), Some("1"));
        assert_eq!(unused, vec!["baz.*", "!gone"]);
    }

    #[test]
    fn test_select() {
        let instructions = Instructions::parse("!a.impl, a.*").unwrap();
        let selected = instructions.select(["a", "a.impl", "a.api", "b"]);
        assert_eq!(selected, vec!["a", "a.api"]);
    }

    proptest! {
        #[test]
        fn test_priority_is_independent_of_order(
            order in Just(vec!["abc", "A", "ghi", "xyz.q"]).prop_shuffle()
        ) {
            let instructions = Instructions::parse("A;x=1, *;x=0").unwrap();
            let mut target = Parameters::new();
            for name in &order {
                target.insert(*name, Attrs::new());
            }
            instructions.decorate(&mut target, false);
            for name in order {
                let expected = if name == "A" { "1" } else { "0" };
                prop_assert_eq!(target.get(name).unwrap().get("x"), Some(expected));
            }
        }
    }
}
