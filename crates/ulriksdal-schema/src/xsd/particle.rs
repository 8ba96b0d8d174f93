#![forbid(unsafe_code)]

//! Content model matching.
//!
//! A content model compiles to a small instruction program that is run as
//! a Thompson simulation over the element children, so matching is linear
//! in the number of children whatever the model looks like. Threads are
//! kept in priority order and the first thread to reach `Match` wins.

use std::collections::HashSet;

use ulriksdal_core::{Error, Result};

use super::model::{ElementId, NamespaceConstraint, Particle, QName, Term, Wildcard};
use super::SchemaSet;

/// Upper bound on compiled program size, which bounds counted repetition.
const MAX_INSTRUCTIONS: usize = 50_000;
const MAX_GROUP_DEPTH: usize = 64;

/// What matched an element child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Leaf {
    /// A declaration, or the head of a substitution group.
    Element(ElementId),
    Wildcard(Wildcard),
}

#[derive(Debug, Clone, Copy)]
enum Inst {
    Leaf(usize),
    /// Try the first target, then the second.
    Split(usize, usize),
    Jump(usize),
    Fail,
    Match,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// The leaf each child matched.
    Matched(Vec<Leaf>),
    /// The child at this index cannot appear here; lists what could.
    Unexpected { index: usize, expected: Vec<String> },
    /// The children ran out before the model was satisfied.
    Incomplete { expected: Vec<String> },
}

#[derive(Debug)]
enum Program {
    Sequence(Vec<Inst>),
    All { members: Vec<(usize, bool)>, optional: bool },
}

#[derive(Debug)]
pub(crate) struct Automaton {
    program: Program,
    leaves: Vec<Leaf>,
    /// Leaf names for diagnostics.
    labels: Vec<String>,
}

impl Automaton {
    /// Compile particles that follow each other, as an extension's
    /// content follows its base type's content.
    pub(crate) fn compile(set: &SchemaSet, particles: &[&Particle]) -> Result<Self> {
        if let [single] = particles {
            if let Term::All(members) = &single.term {
                return Self::compile_all(set, members, single.min == 0);
            }
        }
        let mut builder = Builder {
            set,
            insts: Vec::new(),
            leaves: Vec::new(),
        };
        for particle in particles {
            builder.particle(particle, 0)?;
        }
        builder.insts.push(Inst::Match);
        let labels = labels(set, &builder.leaves)?;
        Ok(Self {
            program: Program::Sequence(builder.insts),
            leaves: builder.leaves,
            labels,
        })
    }

    fn compile_all(set: &SchemaSet, members: &[Particle], optional: bool) -> Result<Self> {
        let mut leaves = Vec::new();
        let mut required = Vec::new();
        for member in members {
            let leaf = match &member.term {
                Term::Element(id) => Leaf::Element(*id),
                Term::ElementRef(name) => Leaf::Element(resolve_element(set, name)?),
                _ => {
                    return Err(Error::Parse(
                        "cos-all-limited: all groups may only hold elements".into(),
                    ))
                }
            };
            required.push((leaves.len(), member.min > 0));
            leaves.push(leaf);
        }
        let labels = labels(set, &leaves)?;
        Ok(Self {
            program: Program::All {
                members: required,
                optional,
            },
            leaves,
            labels,
        })
    }

    /// Match `children` in order. `accepts` decides whether a child can be
    /// matched by a leaf. At most `budget` thread steps are taken.
    pub(crate) fn run(
        &self,
        children: &[QName],
        budget: u64,
        accepts: impl Fn(&Leaf, &QName) -> Result<bool>,
    ) -> Result<Outcome> {
        match &self.program {
            Program::Sequence(insts) => self.run_sequence(insts, children, budget, accepts),
            Program::All { members, optional } => {
                self.run_all(members, *optional, children, accepts)
            }
        }
    }

    fn run_sequence(
        &self,
        insts: &[Inst],
        children: &[QName],
        budget: u64,
        accepts: impl Fn(&Leaf, &QName) -> Result<bool>,
    ) -> Result<Outcome> {
        let mut steps = 0u64;
        let mut current = Vec::new();
        add_thread(insts, &mut current, 0, Vec::new(), &mut steps, budget)?;
        for (index, child) in children.iter().enumerate() {
            let mut next = Vec::new();
            let mut seen = HashSet::new();
            for (pc, path) in &current {
                let Inst::Leaf(leaf) = insts[*pc] else {
                    continue;
                };
                if accepts(&self.leaves[leaf], child)? {
                    let mut path = path.clone();
                    path.push(leaf);
                    let mut found = Vec::new();
                    add_thread(insts, &mut found, pc + 1, path, &mut steps, budget)?;
                    for (pc, path) in found {
                        if seen.insert(pc) {
                            next.push((pc, path));
                        }
                    }
                }
            }
            if next.is_empty() {
                let expected = self.describe(current.iter().filter_map(|(pc, _)| match insts[*pc] {
                    Inst::Leaf(leaf) => Some(leaf),
                    _ => None,
                }));
                return Ok(Outcome::Unexpected { index, expected });
            }
            current = next;
        }
        if let Some((_, path)) = current
            .iter()
            .find(|(pc, _)| matches!(insts[*pc], Inst::Match))
        {
            let leaves = path.iter().map(|&i| self.leaves[i].clone()).collect();
            return Ok(Outcome::Matched(leaves));
        }
        let expected = self.describe(current.iter().filter_map(|(pc, _)| match insts[*pc] {
            Inst::Leaf(leaf) => Some(leaf),
            _ => None,
        }));
        Ok(Outcome::Incomplete { expected })
    }

    fn run_all(
        &self,
        members: &[(usize, bool)],
        optional: bool,
        children: &[QName],
        accepts: impl Fn(&Leaf, &QName) -> Result<bool>,
    ) -> Result<Outcome> {
        if children.is_empty() && optional {
            return Ok(Outcome::Matched(Vec::new()));
        }
        let mut used = vec![false; members.len()];
        let mut matched = Vec::with_capacity(children.len());
        for (index, child) in children.iter().enumerate() {
            let mut hit = None;
            for (slot, (leaf, _)) in members.iter().enumerate() {
                if !used[slot] && accepts(&self.leaves[*leaf], child)? {
                    hit = Some((slot, *leaf));
                    break;
                }
            }
            let Some((slot, leaf)) = hit else {
                let expected = self.describe(
                    members
                        .iter()
                        .enumerate()
                        .filter(|(slot, _)| !used[*slot])
                        .map(|(_, (leaf, _))| *leaf),
                );
                return Ok(Outcome::Unexpected { index, expected });
            };
            used[slot] = true;
            matched.push(self.leaves[leaf].clone());
        }
        let missing: Vec<usize> = members
            .iter()
            .enumerate()
            .filter(|(slot, (_, required))| *required && !used[*slot])
            .map(|(_, (leaf, _))| *leaf)
            .collect();
        if !missing.is_empty() {
            return Ok(Outcome::Incomplete {
                expected: self.describe(missing.into_iter()),
            });
        }
        Ok(Outcome::Matched(matched))
    }

    fn describe(&self, leaves: impl Iterator<Item = usize>) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for leaf in leaves {
            let label = &self.labels[leaf];
            if !names.contains(label) {
                names.push(label.clone());
            }
        }
        names
    }

}

/// Follow epsilon edges from `pc`, appending the threads that wait on a
/// leaf or have matched.
fn add_thread(
    insts: &[Inst],
    threads: &mut Vec<(usize, Vec<usize>)>,
    pc: usize,
    path: Vec<usize>,
    steps: &mut u64,
    budget: u64,
) -> Result<()> {
    let mut stack = vec![pc];
    let mut visited = HashSet::new();
    while let Some(pc) = stack.pop() {
        *steps += 1;
        if *steps > budget {
            return Err(Error::Parse(format!(
                "content model matching exceeded {budget} steps"
            )));
        }
        if !visited.insert(pc) {
            continue;
        }
        match insts[pc] {
            Inst::Split(first, second) => {
                stack.push(second);
                stack.push(first);
            }
            Inst::Jump(target) => stack.push(target),
            Inst::Fail => {}
            Inst::Leaf(_) | Inst::Match => threads.push((pc, path.clone())),
        }
    }
    Ok(())
}

fn labels(set: &SchemaSet, leaves: &[Leaf]) -> Result<Vec<String>> {
    leaves
        .iter()
        .map(|leaf| {
            Ok(match leaf {
                Leaf::Element(id) => set.element_decl(*id)?.name.to_string(),
                Leaf::Wildcard(w) => match &w.namespaces {
                    NamespaceConstraint::Any => "WC[##any]".to_owned(),
                    NamespaceConstraint::Other(_) => "WC[##other]".to_owned(),
                    NamespaceConstraint::Set(set) => format!(
                        "WC[{}]",
                        set.iter()
                            .map(|ns| ns.as_deref().unwrap_or("##local"))
                            .collect::<Vec<_>>()
                            .join(",")
                    ),
                },
            })
        })
        .collect()
}

fn resolve_element(set: &SchemaSet, name: &QName) -> Result<ElementId> {
    set.element_names
        .get(name)
        .copied()
        .ok_or_else(|| Error::Parse(format!("src-resolve: cannot resolve element '{name}'")))
}

struct Builder<'s> {
    set: &'s SchemaSet,
    insts: Vec<Inst>,
    leaves: Vec<Leaf>,
}

impl Builder<'_> {
    fn push(&mut self, inst: Inst) -> Result<usize> {
        if self.insts.len() >= MAX_INSTRUCTIONS {
            return Err(Error::Parse(format!(
                "content model exceeds {MAX_INSTRUCTIONS} instructions"
            )));
        }
        self.insts.push(inst);
        Ok(self.insts.len() - 1)
    }

    fn particle(&mut self, particle: &Particle, depth: usize) -> Result<()> {
        for _ in 0..particle.min {
            self.term(&particle.term, depth)?;
        }
        match particle.max {
            None => {
                let split = self.push(Inst::Split(0, 0))?;
                self.term(&particle.term, depth)?;
                self.push(Inst::Jump(split))?;
                let end = self.insts.len();
                self.insts[split] = Inst::Split(split + 1, end);
            }
            Some(max) => {
                let mut splits = Vec::new();
                for _ in particle.min..max {
                    let split = self.push(Inst::Split(0, 0))?;
                    splits.push(split);
                    self.term(&particle.term, depth)?;
                }
                let end = self.insts.len();
                for split in splits {
                    self.insts[split] = Inst::Split(split + 1, end);
                }
            }
        }
        Ok(())
    }

    fn term(&mut self, term: &Term, depth: usize) -> Result<()> {
        if depth > MAX_GROUP_DEPTH {
            return Err(Error::Parse("model groups nest too deeply".into()));
        }
        match term {
            Term::Element(id) => self.leaf(Leaf::Element(*id)),
            Term::ElementRef(name) => {
                let id = resolve_element(self.set, name)?;
                self.leaf(Leaf::Element(id))
            }
            Term::Wildcard(wildcard) => self.leaf(Leaf::Wildcard(wildcard.clone())),
            Term::Group(name) => {
                let group = self.set.groups.get(name).ok_or_else(|| {
                    Error::Parse(format!("src-resolve: cannot resolve group '{name}'"))
                })?;
                self.particle(group, depth + 1)
            }
            Term::Sequence(particles) => {
                for particle in particles {
                    self.particle(particle, depth + 1)?;
                }
                Ok(())
            }
            Term::Choice(particles) => {
                let Some((last, alternatives)) = particles.split_last() else {
                    self.push(Inst::Fail)?;
                    return Ok(());
                };
                let mut jumps = Vec::new();
                for particle in alternatives {
                    let split = self.push(Inst::Split(0, 0))?;
                    self.particle(particle, depth + 1)?;
                    jumps.push(self.push(Inst::Jump(0))?);
                    let next = self.insts.len();
                    self.insts[split] = Inst::Split(split + 1, next);
                }
                self.particle(last, depth + 1)?;
                let end = self.insts.len();
                for jump in jumps {
                    self.insts[jump] = Inst::Jump(end);
                }
                Ok(())
            }
            Term::All(_) => Err(Error::Parse(
                "cos-all-limited.1: an all group must be a whole content model".into(),
            )),
        }
    }

    fn leaf(&mut self, leaf: Leaf) -> Result<()> {
        self.leaves.push(leaf);
        self.push(Inst::Leaf(self.leaves.len() - 1))?;
        Ok(())
    }
}
