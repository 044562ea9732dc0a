use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use dynmsg::message::{FieldPath, Message, PathStep, Value};
use dynmsg::schema::{DescriptorParser, FieldType};

use crate::field::FieldRef;
use crate::sampler::WeightedReservoirSampler;
use crate::value::{random_bool, random_index, ValueMutator};

const MAX_INITIALIZE_DEPTH: usize = 32;
const DELETION_THRESHOLD: usize = 128;
const MUTATE_WEIGHT: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// Adds a new field with its default value.
    Add,
    /// Mutates scalar field contents.
    Mutate,
    /// Deletes a field.
    Delete,
    /// Overwrites a field with the value of another type-compatible field.
    Copy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampledMutation {
    pub mutation: Mutation,
    pub path: FieldPath,
}

fn candidate(mutation: Mutation, prefix: &[PathStep], last: PathStep) -> SampledMutation {
    let mut steps = prefix.to_vec();
    steps.push(last);
    SampledMutation {
        mutation,
        path: FieldPath::new(steps),
    }
}

/// Candidate weights for one `mutate` call. Adding and deleting are
/// intrusive edits and run at a tenth of the point-mutation weight; when
/// the size hint leaves little room to grow, the balance shifts further
/// towards deletion so the tree cannot grow without bound.
struct Weights {
    add: u64,
    delete: u64,
}

impl Weights {
    fn new(size_hint: usize) -> Self {
        let mut add = MUTATE_WEIGHT / 10;
        let mut delete = MUTATE_WEIGHT / 10;
        if size_hint < DELETION_THRESHOLD {
            let adjustment = 0.5 * size_hint as f64 / DELETION_THRESHOLD as f64;
            add = (add as f64 * adjustment) as u64;
            delete = (delete as f64 * (1.0 - adjustment)) as u64;
        }
        Self { add, delete }
    }

    /// Copying a sub-tree can grow the message substantially, so message
    /// fields copy at the add weight.
    fn copy(&self, field_type: &FieldType) -> u64 {
        if field_type.is_message() {
            self.add
        } else {
            MUTATE_WEIGHT
        }
    }
}

fn field_type_at<'a>(message: &'a Message, path: &FieldPath) -> Result<&'a FieldType, String> {
    let (last, prefix) = path
        .steps
        .split_last()
        .ok_or_else(|| "empty field path".to_string())?;
    let parent = message
        .descend(prefix)
        .ok_or_else(|| format!("dangling field path {}", path))?;
    parent
        .descriptor()
        .fields
        .get(last.field)
        .map(|field| &field.field_type)
        .ok_or_else(|| format!("field path {} out of range", path))
}

fn value_at<'a>(message: &'a Message, path: &FieldPath) -> Result<&'a Value, String> {
    let (last, prefix) = path
        .steps
        .split_last()
        .ok_or_else(|| "empty field path".to_string())?;
    let parent = message
        .descend(prefix)
        .ok_or_else(|| format!("dangling field path {}", path))?;
    parent
        .get(last.field, last.index)
        .ok_or_else(|| format!("no value at field path {}", path))
}

/// Bounded-depth repair: installs defaults for unset required fields and
/// recurses into uninitialized sub-messages. The depth bound terminates
/// mutually-required schema cycles, which may be unsatisfiable; the
/// caller's `is_initialized` check is the diagnostic for those.
fn initialize_message(
    message: &mut Message,
    registry: &DescriptorParser,
    max_depth: usize,
) -> Result<(), String> {
    let descriptor = message.descriptor().clone();
    for (i, field) in descriptor.fields.iter().enumerate() {
        if field.is_required() && !message.has(i) {
            FieldRef::new(message, i, None).create_default(registry)?;
        }

        if max_depth > 0 && field.field_type.is_message() {
            if field.is_repeated() {
                for j in 0..message.len(i) {
                    if let Some(child) = message.nested_mut(i, Some(j)) {
                        if !child.is_initialized() {
                            initialize_message(child, registry, max_depth - 1)?;
                        }
                    }
                }
            } else if let Some(child) = message.nested_mut(i, None) {
                if !child.is_initialized() {
                    initialize_message(child, registry, max_depth - 1)?;
                }
            }
        }
    }
    Ok(())
}

/// Applies one structure-preserving mutation per call to a message tree.
///
/// The mutator owns a seeded random generator; identically seeded
/// mutators applied to equal inputs through equal call sequences produce
/// equal outputs.
pub struct Mutator<'p> {
    registry: &'p DescriptorParser,
    rng: StdRng,
    keep_initialized: bool,
}

impl<'p> Mutator<'p> {
    pub fn new(registry: &'p DescriptorParser, seed: u64) -> Self {
        Self {
            registry,
            rng: StdRng::seed_from_u64(seed),
            keep_initialized: true,
        }
    }

    /// When enabled (the default), required-field presence is restored
    /// after every operation and deleting required fields is never
    /// sampled.
    pub fn set_keep_initialized(&mut self, keep_initialized: bool) {
        self.keep_initialized = keep_initialized;
    }

    /// Mutates one site of the tree, selected uniformly by weight over a
    /// single traversal.
    ///
    /// # Type Parameters
    /// * `S` - reservoir sampler for mutation candidates
    /// * `D` - reservoir sampler for copy data sources
    /// * `V` - scalar value mutator
    pub fn mutate<S, D, V>(&mut self, message: &mut Message, size_hint: usize) -> Result<(), String>
    where
        S: WeightedReservoirSampler<SampledMutation>,
        D: WeightedReservoirSampler<FieldPath>,
        V: ValueMutator,
    {
        let mut sampler = S::new(self.rng.gen());
        let mut value_mutator = V::new(self.rng.gen());

        let weights = Weights::new(size_hint);
        let mut prefix = Vec::new();
        self.sample_mutations(message, &weights, &mut prefix, &mut sampler);

        // A schema without fields (or one whose only candidates carry zero
        // weight) offers no site; the repair pass below still applies.
        if let Some(sampled) = sampler.into_selected() {
            match sampled.mutation {
                Mutation::Add => {
                    let mut site = FieldRef::resolve(message, &sampled.path)?;
                    if random_bool(&mut self.rng, 2) {
                        site.create_mutated(self.registry, &mut value_mutator, size_hint / 2)?;
                    } else {
                        site.create_default(self.registry)?;
                    }
                }
                Mutation::Mutate => {
                    let mut site = FieldRef::resolve(message, &sampled.path)?;
                    site.mutate_in_place(&mut value_mutator, size_hint / 2)?;
                }
                Mutation::Delete => {
                    FieldRef::resolve(message, &sampled.path)?.delete()?;
                }
                Mutation::Copy => {
                    let target_type = field_type_at(message, &sampled.path)?.clone();
                    let mut sources = D::new(self.rng.gen());
                    let mut prefix = Vec::new();
                    self.sample_data_sources(message, &target_type, &mut prefix, &mut sources);

                    match sources.into_selected() {
                        // No compatible source in the tree; fall back to
                        // deletion.
                        None => FieldRef::resolve(message, &sampled.path)?.delete()?,
                        Some(source_path) => {
                            let value = value_at(message, &source_path)?.clone();
                            FieldRef::resolve(message, &sampled.path)?.copy_from(value)?;
                        }
                    }
                }
            }
        }

        if self.keep_initialized && !message.is_initialized() {
            initialize_message(message, self.registry, MAX_INITIALIZE_DEPTH)?;
        }
        Ok(())
    }

    /// Recombines `source` into `target`. Both messages must share a
    /// schema.
    pub fn cross_over(&mut self, source: &Message, target: &mut Message) -> Result<(), String> {
        if source.descriptor().name != target.descriptor().name {
            return Err(format!(
                "cross-over requires messages of the same schema: '{}' vs '{}'",
                source.descriptor().name,
                target.descriptor().name
            ));
        }

        self.cross_over_impl(source, target)?;

        if self.keep_initialized && !target.is_initialized() {
            initialize_message(target, self.registry, MAX_INITIALIZE_DEPTH)?;
        }
        Ok(())
    }

    /// One pass over every field of every message in the tree, offering
    /// each candidate `(site, mutation)` pair to the reservoir.
    fn sample_mutations<S>(
        &mut self,
        message: &Message,
        weights: &Weights,
        prefix: &mut Vec<PathStep>,
        sampler: &mut S,
    ) where
        S: WeightedReservoirSampler<SampledMutation>,
    {
        for (i, field) in message.descriptor().fields.iter().enumerate() {
            if let Some(group) = field.oneof {
                // The whole choice group is handled once, at its first
                // member.
                if message.descriptor().oneofs[group].fields[0] == i {
                    let members = &message.descriptor().oneofs[group].fields;
                    let pick = members[random_index(&mut self.rng, members.len())];
                    sampler.offer(
                        weights.add,
                        candidate(
                            Mutation::Add,
                            prefix,
                            PathStep {
                                field: pick,
                                index: None,
                            },
                        ),
                    );

                    if let Some(set_member) = message.oneof_field(group) {
                        let set_type = &message.descriptor().fields[set_member].field_type;
                        let step = PathStep {
                            field: set_member,
                            index: None,
                        };
                        if !set_type.is_message() {
                            sampler.offer(
                                MUTATE_WEIGHT,
                                candidate(Mutation::Mutate, prefix, step),
                            );
                        }
                        sampler.offer(weights.delete, candidate(Mutation::Delete, prefix, step));
                        sampler.offer(
                            weights.copy(set_type),
                            candidate(Mutation::Copy, prefix, step),
                        );
                    }
                }
            } else if field.is_repeated() {
                let size = message.len(i);
                sampler.offer(
                    weights.add,
                    candidate(
                        Mutation::Add,
                        prefix,
                        PathStep {
                            field: i,
                            index: Some(random_index(&mut self.rng, size + 1)),
                        },
                    ),
                );

                if size > 0 {
                    let step = PathStep {
                        field: i,
                        index: Some(random_index(&mut self.rng, size)),
                    };
                    if !field.field_type.is_message() {
                        sampler.offer(MUTATE_WEIGHT, candidate(Mutation::Mutate, prefix, step));
                    }
                    sampler.offer(weights.delete, candidate(Mutation::Delete, prefix, step));
                    sampler.offer(
                        weights.copy(&field.field_type),
                        candidate(Mutation::Copy, prefix, step),
                    );
                }
            } else if message.has(i) {
                let step = PathStep {
                    field: i,
                    index: None,
                };
                if !field.field_type.is_message() {
                    sampler.offer(MUTATE_WEIGHT, candidate(Mutation::Mutate, prefix, step));
                }
                if !field.is_required() || !self.keep_initialized {
                    sampler.offer(weights.delete, candidate(Mutation::Delete, prefix, step));
                }
                sampler.offer(
                    weights.copy(&field.field_type),
                    candidate(Mutation::Copy, prefix, step),
                );
            } else {
                sampler.offer(
                    weights.add,
                    candidate(
                        Mutation::Add,
                        prefix,
                        PathStep {
                            field: i,
                            index: None,
                        },
                    ),
                );
            }

            // Recurse into every present sub-message.
            if field.field_type.is_message() {
                if field.is_repeated() {
                    for j in 0..message.len(i) {
                        if let Some(child) = message.nested(i, Some(j)) {
                            prefix.push(PathStep {
                                field: i,
                                index: Some(j),
                            });
                            self.sample_mutations(child, weights, prefix, sampler);
                            prefix.pop();
                        }
                    }
                } else if let Some(child) = message.nested(i, None) {
                    prefix.push(PathStep {
                        field: i,
                        index: None,
                    });
                    self.sample_mutations(child, weights, prefix, sampler);
                    prefix.pop();
                }
            }
        }
    }

    /// Collects every set field whose schema type matches the copy
    /// target. Repeated fields contribute with weight equal to their size
    /// and a uniformly chosen element; singular fields with weight one.
    fn sample_data_sources<D>(
        &mut self,
        message: &Message,
        target: &FieldType,
        prefix: &mut Vec<PathStep>,
        sampler: &mut D,
    ) where
        D: WeightedReservoirSampler<FieldPath>,
    {
        for (i, field) in message.descriptor().fields.iter().enumerate() {
            if field.field_type.is_message() {
                if field.is_repeated() {
                    for j in 0..message.len(i) {
                        if let Some(child) = message.nested(i, Some(j)) {
                            prefix.push(PathStep {
                                field: i,
                                index: Some(j),
                            });
                            self.sample_data_sources(child, target, prefix, sampler);
                            prefix.pop();
                        }
                    }
                } else if let Some(child) = message.nested(i, None) {
                    prefix.push(PathStep {
                        field: i,
                        index: None,
                    });
                    self.sample_data_sources(child, target, prefix, sampler);
                    prefix.pop();
                }
            }

            if field.field_type != *target {
                continue;
            }

            if field.is_repeated() {
                let size = message.len(i);
                if size > 0 {
                    let mut steps = prefix.clone();
                    steps.push(PathStep {
                        field: i,
                        index: Some(random_index(&mut self.rng, size)),
                    });
                    sampler.offer(size as u64, FieldPath::new(steps));
                }
            } else if message.has(i) {
                let mut steps = prefix.clone();
                steps.push(PathStep {
                    field: i,
                    index: None,
                });
                sampler.offer(1, FieldPath::new(steps));
            }
        }
    }

    fn cross_over_impl(&mut self, source: &Message, target: &mut Message) -> Result<(), String> {
        let descriptor = target.descriptor().clone();
        for (i, field) in descriptor.fields.iter().enumerate() {
            if field.is_repeated() {
                // Append every source element, shuffle the combined list,
                // keep a uniformly chosen prefix.
                for j in 0..source.len(i) {
                    let value = source
                        .get(i, Some(j))
                        .ok_or_else(|| "missing repeated source element".to_string())?
                        .clone();
                    let end = target.len(i);
                    FieldRef::new(target, i, Some(end)).append_from(value)?;
                }

                let size = target.len(i);
                for j in 0..size {
                    let k = random_index(&mut self.rng, size - j);
                    if k != 0 {
                        target.swap(i, j, j + k)?;
                    }
                }

                let keep = random_index(&mut self.rng, size + 1);

                if field.field_type.is_message() {
                    let remove = size - keep;
                    // Blend some of the sub-trees about to be dropped into
                    // the ones that stay.
                    let cross = random_index(&mut self.rng, keep.min(remove) + 1);
                    for _ in 0..cross {
                        let k = random_index(&mut self.rng, keep);
                        let r = keep + random_index(&mut self.rng, remove);
                        let (kept, removed) = target
                            .repeated_pair_mut(i, k, r)
                            .ok_or_else(|| "cross-over indices out of bounds".to_string())?;
                        match (kept, removed) {
                            (Value::Message(kept), Value::Message(removed)) => {
                                self.cross_over_impl(&*removed, kept)?;
                            }
                            _ => {
                                return Err(
                                    "repeated message field holds a non-message value".to_string()
                                )
                            }
                        }
                    }
                }

                target.truncate(i, keep)?;
            } else if field.field_type.is_message() {
                if !source.has(i) {
                    if random_bool(&mut self.rng, 2) {
                        FieldRef::new(target, i, None).delete()?;
                    }
                } else if !target.has(i) {
                    if random_bool(&mut self.rng, 2) {
                        let value = source
                            .get(i, None)
                            .ok_or_else(|| "missing source sub-message".to_string())?
                            .clone();
                        FieldRef::new(target, i, None).copy_from(value)?;
                    }
                } else {
                    let child_source = source
                        .nested(i, None)
                        .ok_or_else(|| "missing source sub-message".to_string())?;
                    let child_target = target
                        .nested_mut(i, None)
                        .ok_or_else(|| "missing target sub-message".to_string())?;
                    self.cross_over_impl(child_source, child_target)?;
                }
            } else if random_bool(&mut self.rng, 2) {
                if source.has(i) {
                    let value = source
                        .get(i, None)
                        .ok_or_else(|| "missing source value".to_string())?
                        .clone();
                    FieldRef::new(target, i, None).copy_from(value)?;
                } else {
                    FieldRef::new(target, i, None).delete()?;
                }
            }
        }
        Ok(())
    }
}
