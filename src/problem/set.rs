use indexmap::{IndexMap, IndexSet};
use serde::{Serialize, Serializer, ser::SerializeSeq};

use crate::problem::{Problem, ProblemLocation};

/// Deduplicated problems, each with the ordered set of locations it was seen at.
///
/// Iteration follows first insertion; equality ignores order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProblemSet {
    problems: IndexMap<Problem, IndexSet<ProblemLocation>>,
}

impl ProblemSet {
    pub fn new() -> Self {
        ProblemSet::default()
    }

    /// Returns `true` when `problem` was not recorded before.
    pub fn add(&mut self, problem: Problem, location: ProblemLocation) -> bool {
        let mut fresh = false;
        self.problems
            .entry(problem)
            .or_insert_with(|| {
                fresh = true;
                IndexSet::new()
            })
            .insert(location);
        fresh
    }

    pub fn merge(&mut self, other: ProblemSet) {
        for (problem, locations) in other.problems {
            self.problems.entry(problem).or_default().extend(locations);
        }
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn contains(&self, problem: &Problem) -> bool {
        self.problems.contains_key(problem)
    }

    pub fn locations(&self, problem: &Problem) -> Option<&IndexSet<ProblemLocation>> {
        self.problems.get(problem)
    }

    pub fn problems(&self) -> impl Iterator<Item = &Problem> {
        self.problems.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Problem, &IndexSet<ProblemLocation>)> {
        self.problems.iter()
    }

    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Problem> + 'a {
        self.problems.keys().filter(move |p| p.kind() == kind)
    }
}

impl IntoIterator for ProblemSet {
    type Item = (Problem, IndexSet<ProblemLocation>);
    type IntoIter = indexmap::map::IntoIter<Problem, IndexSet<ProblemLocation>>;

    fn into_iter(self) -> Self::IntoIter {
        self.problems.into_iter()
    }
}

#[derive(Serialize)]
struct Entry<'a> {
    #[serde(flatten)]
    problem: &'a Problem,
    description: String,
    locations: &'a IndexSet<ProblemLocation>,
}

impl Serialize for ProblemSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.problems.len()))?;
        for (problem, locations) in &self.problems {
            seq.serialize_element(&Entry {
                problem,
                description: problem.description(),
                locations,
            })?;
        }
        seq.end()
    }
}
