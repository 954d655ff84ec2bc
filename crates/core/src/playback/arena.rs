use crate::{synth::Tone, timeline::VoiceId};

/// Handle to a tone slot. Handles from before a `clear` or a release are
/// stale and every operation on them is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ToneHandle {
    index: usize,
    generation: u32,
}

#[derive(Debug)]
pub(crate) struct ActiveTone {
    pub voice: VoiceId,
    pub tone: Tone,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    tone: Option<ActiveTone>,
}

/// Slot storage for in-flight tones, released one by one as they finish or
/// all at once on stop.
#[derive(Debug, Default)]
pub(crate) struct ToneArena {
    slots: Vec<Slot>,
    free: Vec<usize>,
    live: usize,
}

impl ToneArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn insert(&mut self, voice: VoiceId, tone: Tone) -> ToneHandle {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                self.slots.len() - 1
            }
        };
        let slot = &mut self.slots[index];
        slot.tone = Some(ActiveTone { voice, tone });
        self.live += 1;
        ToneHandle {
            index,
            generation: slot.generation,
        }
    }

    pub fn get(&self, handle: ToneHandle) -> Option<&ActiveTone> {
        self.slots
            .get(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.tone.as_ref())
    }

    /// Frees the slot. Returns `false` when the handle was already stale.
    pub fn release(&mut self, handle: ToneHandle) -> bool {
        let Some(slot) = self.slots.get_mut(handle.index) else {
            return false;
        };
        if slot.generation != handle.generation || slot.tone.is_none() {
            return false;
        }
        slot.tone = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        true
    }

    /// Releases every tone; all outstanding handles become stale.
    pub fn clear(&mut self) {
        self.free.clear();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.tone.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
            self.free.push(index);
        }
        self.live = 0;
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ToneHandle, &mut ActiveTone)> + '_ {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.tone
                .as_mut()
                .map(|tone| (ToneHandle { index, generation }, tone))
        })
    }
}
