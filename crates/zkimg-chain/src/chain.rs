//! # Proof Chain
//!
//! An ordered sequence of transformation steps linked by Poseidon
//! commitments. Only the first input commitment and the last output
//! commitment are disclosed; intermediate images never leave the prover.
//!
//! ## Lifecycle
//!
//! 1. [`ProofChain::add_step`] commits to both images and keeps the pixels
//!    only as the pending witness for that step.
//! 2. [`ProofChain::generate_chain_proofs`] checks continuity over the whole
//!    chain first, then proves pending steps strictly in order. Each witness
//!    is consumed by its proof.
//! 3. The resulting [`ChainResult`] is the shareable bundle.
//!
//! ## Verification
//!
//! [`verify_continuity`] replays every check that needs no verification
//! key: hash continuity, proof commitments, circuit/transformation
//! agreement, recursion states and accumulators. [`verify_chain`] adds
//! per-step proof verification. Both must pass.

use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;
use zkimg_core::{Deadline, InputError, PixelMatrix, Transformation};
use zkimg_crypto::{image_commitment, FieldElement};
use zkimg_zkp::{CircuitShape, Proof, Prover, ProvingBackend};

use crate::error::{ChainError, ChainProofError};
use crate::recursion::{fold, RecursionState, DEFAULT_MAX_CHAIN_DEPTH};

/// One link of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStep {
    pub index: usize,
    pub input_hash: FieldElement,
    pub output_hash: FieldElement,
    pub transformation: Transformation,
    pub state: RecursionState,
    /// Recursion accumulator after this step. Set once proven.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accumulator: Option<FieldElement>,
    /// Set once proven.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<Proof>,
}

impl ChainStep {
    pub fn is_proven(&self) -> bool {
        self.proof.is_some() && self.accumulator.is_some()
    }
}

/// A fully proven chain: the disclosed commitments and every step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainResult {
    pub initial_hash: FieldElement,
    pub final_hash: FieldElement,
    pub steps: Vec<ChainStep>,
}

impl ChainResult {
    pub fn proofs(&self) -> impl Iterator<Item = &Proof> {
        self.steps.iter().filter_map(|s| s.proof.as_ref())
    }
}

#[derive(Debug)]
struct PendingWitness {
    shape: CircuitShape,
    pre: PixelMatrix,
    post: PixelMatrix,
}

/// A chain under construction.
#[derive(Debug)]
pub struct ProofChain {
    id: Uuid,
    max_depth: u32,
    steps: Vec<ChainStep>,
    witnesses: Vec<Option<PendingWitness>>,
}

impl Default for ProofChain {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHAIN_DEPTH)
    }
}

impl ProofChain {
    pub fn new(max_depth: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            max_depth,
            steps: Vec::new(),
            witnesses: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn steps(&self) -> &[ChainStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Commit to `input -> output` under `transformation` and queue the
    /// pixels as the step's witness.
    ///
    /// Continuity with the previous step is not checked here; proving
    /// checks it for the whole chain.
    ///
    /// # Errors
    ///
    /// - [`ChainProofError::Input`] when the transformation cannot apply to
    ///   `input` or `output` has the wrong shape.
    /// - [`ChainError::MaxDepthExceeded`] when the chain is full.
    pub fn add_step(
        &mut self,
        input: PixelMatrix,
        output: PixelMatrix,
        transformation: Transformation,
    ) -> Result<ChainStep, ChainProofError> {
        let shape = CircuitShape::for_transformation(&transformation, input.dims(), input.color())?;
        if (output.dims(), output.color()) != (shape.output_dims(), shape.output_color()) {
            return Err(InputError::OutputShapeMismatch {
                expected: format!("{} {}", shape.output_dims(), shape.output_color().as_str()),
                actual: output.describe(),
            }
            .into());
        }
        let state = match self.steps.last() {
            None => RecursionState::Base,
            Some(prev) => prev.state.advance(self.max_depth)?,
        };
        let input_hash = image_commitment(&input).map_err(ChainError::from)?;
        let output_hash = image_commitment(&output).map_err(ChainError::from)?;

        let step = ChainStep {
            index: self.steps.len(),
            input_hash,
            output_hash,
            transformation,
            state,
            accumulator: None,
            proof: None,
        };
        tracing::debug!(chain = %self.id, chain_step = step.index, %transformation, "step added");
        self.steps.push(step.clone());
        self.witnesses.push(Some(PendingWitness {
            shape,
            pre: input,
            post: output,
        }));
        Ok(step)
    }

    /// Prove every pending step in order and return the chain bundle.
    ///
    /// Continuity is checked over the whole chain before any proof is
    /// produced, so a broken chain yields no proofs at all.
    pub async fn generate_chain_proofs<B: ProvingBackend>(
        &mut self,
        prover: &Prover<B>,
        deadline: Deadline,
    ) -> Result<ChainResult, ChainProofError> {
        if self.steps.is_empty() {
            return Err(ChainError::EmptyChain.into());
        }
        check_continuity(&self.steps)?;

        for index in 0..self.steps.len() {
            if self.steps[index].is_proven() {
                continue;
            }
            let witness = self.witnesses[index]
                .take()
                .ok_or(ChainProofError::WitnessUnavailable { index })?;
            let previous = match index {
                0 => FieldElement::ZERO,
                i => self.steps[i - 1]
                    .accumulator
                    .ok_or(ChainError::StepUnproven { index: i - 1 })?,
            };

            let span = tracing::info_span!("chain_step", chain = %self.id, chain_step = index);
            let proof = prover
                .prove(witness.shape, witness.pre, witness.post, deadline)
                .instrument(span)
                .await
                .map_err(|source| ChainProofError::Prover { index, source })?;

            let step = &mut self.steps[index];
            let (input, output) = proof
                .commitments()
                .map_err(|_| ChainError::StepCommitmentMismatch { index })?;
            if input != step.input_hash || output != step.output_hash {
                return Err(ChainError::StepCommitmentMismatch { index }.into());
            }
            let accumulator = fold(&previous, &input, &output, proof.bytes()).map_err(ChainError::from)?;
            tracing::info!(
                chain = %self.id,
                chain_step = index,
                circuit = %proof.circuit(),
                depth = step.state.depth(),
                "chain step proven"
            );
            step.accumulator = Some(accumulator);
            step.proof = Some(proof);
        }
        Ok(self.result()?)
    }

    /// Drop trailing steps that have no proof. Returns how many were
    /// dropped. Proven steps are never touched.
    pub fn discard_unproven(&mut self) -> usize {
        let keep = self
            .steps
            .iter()
            .rposition(ChainStep::is_proven)
            .map_or(0, |last| last + 1);
        let dropped = self.steps.len() - keep;
        self.steps.truncate(keep);
        self.witnesses.truncate(keep);
        if dropped > 0 {
            tracing::debug!(chain = %self.id, dropped, "unproven steps discarded");
        }
        dropped
    }

    /// The bundle for a fully proven chain.
    pub fn result(&self) -> Result<ChainResult, ChainError> {
        let (first, last) = match (self.steps.first(), self.steps.last()) {
            (Some(f), Some(l)) => (f, l),
            _ => return Err(ChainError::EmptyChain),
        };
        if let Some(unproven) = self.steps.iter().find(|s| !s.is_proven()) {
            return Err(ChainError::StepUnproven { index: unproven.index });
        }
        Ok(ChainResult {
            initial_hash: first.input_hash,
            final_hash: last.output_hash,
            steps: self.steps.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

fn check_continuity(steps: &[ChainStep]) -> Result<(), ChainError> {
    for (i, pair) in steps.windows(2).enumerate() {
        if pair[1].input_hash != pair[0].output_hash {
            return Err(ChainError::ChainBroken { at_index: i + 1 });
        }
    }
    Ok(())
}

fn check_transformation(step: &ChainStep, proof: &Proof) -> Result<(), ChainError> {
    let index = step.index;
    let mismatch = |reason: String| ChainError::StepTransformationMismatch { index, reason };
    let key = proof.circuit();
    if key.kind() != step.transformation.kind() {
        return Err(mismatch(format!("{} circuit for {}", key.kind(), step.transformation)));
    }
    let shape = CircuitShape::from_params(key.kind(), key.params()).map_err(|e| mismatch(e.to_string()))?;
    let expected = CircuitShape::for_transformation(&step.transformation, shape.input_dims(), shape.input_color())
        .map_err(|e| mismatch(e.to_string()))?;
    if expected != shape {
        return Err(mismatch(format!(
            "circuit {key} is not {} of a {} image",
            step.transformation,
            shape.input_dims()
        )));
    }
    Ok(())
}

/// Every check on a bundle that needs no verification key. Returns the
/// disclosed `(initial_hash, final_hash)`.
pub fn verify_continuity(result: &ChainResult, max_depth: u32) -> Result<(FieldElement, FieldElement), ChainError> {
    let steps = &result.steps;
    let (first, last) = match (steps.first(), steps.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => return Err(ChainError::EmptyChain),
    };
    check_continuity(steps)?;
    if first.input_hash != result.initial_hash {
        return Err(ChainError::DisclosedHashMismatch { which: "initial" });
    }
    if last.output_hash != result.final_hash {
        return Err(ChainError::DisclosedHashMismatch { which: "final" });
    }

    let mut previous = FieldElement::ZERO;
    for (position, step) in steps.iter().enumerate() {
        if step.index != position {
            return Err(ChainError::StepOutOfOrder {
                position,
                claimed: step.index,
            });
        }
        if step.state.depth() > max_depth {
            return Err(ChainError::MaxDepthExceeded {
                depth: step.state.depth(),
                max: max_depth,
            });
        }
        if step.state != RecursionState::for_index(position) {
            return Err(ChainError::RecursionLinkMismatch { index: position });
        }
        let (proof, accumulator) = match (&step.proof, step.accumulator) {
            (Some(p), Some(a)) => (p, a),
            _ => return Err(ChainError::StepUnproven { index: position }),
        };
        match proof.commitments() {
            Ok((input, output)) if input == step.input_hash && output == step.output_hash => {}
            _ => return Err(ChainError::StepCommitmentMismatch { index: position }),
        }
        check_transformation(step, proof)?;
        let expected = fold(&previous, &step.input_hash, &step.output_hash, proof.bytes())?;
        if expected != accumulator {
            return Err(ChainError::RecursionLinkMismatch { index: position });
        }
        previous = accumulator;
    }
    Ok((result.initial_hash, result.final_hash))
}

/// [`verify_continuity`] plus verification of every step's proof against
/// the step's commitments. Verification keys come from `prover`'s cache and
/// store; nothing is compiled.
pub fn verify_chain<B: ProvingBackend>(
    result: &ChainResult,
    prover: &Prover<B>,
    max_depth: u32,
) -> Result<(FieldElement, FieldElement), ChainError> {
    let disclosed = verify_continuity(result, max_depth)?;
    for step in &result.steps {
        let proof = step.proof.as_ref().ok_or(ChainError::StepUnproven { index: step.index })?;
        let outcome = prover.verify_against(proof, &step.input_hash, &step.output_hash);
        if !outcome.is_valid() {
            return Err(ChainError::StepProofInvalid {
                index: step.index,
                diagnostic: outcome.diagnostic.unwrap_or_default(),
            });
        }
    }
    Ok(disclosed)
}
