use rand::seq::SliceRandom;
use rand::Rng;
use std::{collections::VecDeque, fmt, str::FromStr, time::Duration};
use tracing::{debug, info};

use super::track::Track;
use crate::error::{PlayerError, Result};

/// Política de repetición al terminar un track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepeatMode {
    #[default]
    Off,
    Track,
    Queue,
}

impl RepeatMode {
    /// Off -> Queue -> Track -> Off
    pub fn cycle(self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::Queue,
            RepeatMode::Queue => RepeatMode::Track,
            RepeatMode::Track => RepeatMode::Off,
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RepeatMode::Off => "off",
            RepeatMode::Track => "track",
            RepeatMode::Queue => "queue",
        };
        f.write_str(name)
    }
}

impl FromStr for RepeatMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(RepeatMode::Off),
            "track" | "song" | "one" => Ok(RepeatMode::Track),
            "queue" | "all" => Ok(RepeatMode::Queue),
            other => Err(format!("unknown repeat mode '{other}'")),
        }
    }
}

/// Cola de tracks pendientes de un guild.
///
/// The queue never holds the track that is currently loaded: once popped, a
/// track belongs to the player until it finishes and is handed back through
/// [`TrackQueue::next_after`].
#[derive(Debug)]
pub struct TrackQueue {
    items: VecDeque<Track>,
    history: VecDeque<Track>,
    shuffle: bool,
    max_history: usize,
}

impl TrackQueue {
    pub fn new(max_history: usize) -> Self {
        Self {
            items: VecDeque::new(),
            history: VecDeque::new(),
            shuffle: false,
            max_history,
        }
    }

    /// Agrega un track al final y devuelve su posición (1 = siguiente).
    pub fn push(&mut self, track: Track) -> usize {
        debug!("➕ Agregado a la cola: {}", track.title());
        self.items.push_back(track);
        self.items.len()
    }

    /// Obtiene el siguiente track (FIFO, o aleatorio con shuffle activo)
    pub fn pop(&mut self) -> Option<Track> {
        if self.shuffle && self.items.len() > 1 {
            let index = rand::thread_rng().gen_range(0..self.items.len());
            let selected = self.items.remove(index);
            if let Some(track) = &selected {
                debug!("🔀 Seleccionado aleatoriamente: {}", track.title());
            }
            selected
        } else {
            self.items.pop_front()
        }
    }

    /// Resolves the next track once `finished` is done, honouring `mode`.
    ///
    /// `Track` hands the finished track straight back; `Queue` appends it to
    /// the tail before taking the head. The finished track is recorded in the
    /// history either way.
    pub fn next_after(&mut self, finished: Option<Track>, mode: RepeatMode) -> Option<Track> {
        if let Some(finished) = finished {
            self.add_to_history(finished.clone());

            match mode {
                RepeatMode::Track => {
                    info!("🔂 Repitiendo track: {}", finished.title());
                    return Some(finished);
                }
                RepeatMode::Queue => {
                    debug!("🔁 Track agregado al final por repetición de cola: {}", finished.title());
                    self.items.push_back(finished);
                }
                RepeatMode::Off => {}
            }
        }

        self.pop()
    }

    /// Records a track that will not be replayed.
    pub fn discard(&mut self, track: Track) {
        self.add_to_history(track);
    }

    /// Mezcla la cola una vez
    pub fn shuffle(&mut self) {
        let mut items: Vec<_> = self.items.drain(..).collect();
        items.shuffle(&mut rand::thread_rng());
        self.items.extend(items);
        info!("🔀 Cola mezclada");
    }

    pub fn set_shuffle(&mut self, enabled: bool) {
        self.shuffle = enabled;
    }

    pub fn is_shuffle(&self) -> bool {
        self.shuffle
    }

    /// Limpia la cola y devuelve cuántos tracks se eliminaron
    pub fn clear(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        removed
    }

    /// Elimina el track en la posición indicada (0 = siguiente)
    pub fn remove(&mut self, index: usize) -> Result<Track> {
        self.items
            .remove(index)
            .ok_or(PlayerError::IndexOutOfRange(index))
    }

    /// Mueve un track a una nueva posición
    pub fn move_track(&mut self, from: usize, to: usize) -> Result<()> {
        if from >= self.items.len() {
            return Err(PlayerError::IndexOutOfRange(from));
        }
        if to >= self.items.len() {
            return Err(PlayerError::IndexOutOfRange(to));
        }

        if from != to {
            if let Some(track) = self.items.remove(from) {
                self.items.insert(to, track);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.items.iter()
    }

    /// Most recently finished first.
    pub fn history(&self) -> impl Iterator<Item = &Track> {
        self.history.iter().rev()
    }

    /// Duración conocida de los tracks en cola; los streams no suman.
    pub fn total_duration(&self) -> Duration {
        self.items.iter().filter_map(Track::duration).sum()
    }

    fn add_to_history(&mut self, track: Track) {
        if self.max_history == 0 {
            return;
        }
        if self.history.len() == self.max_history {
            self.history.pop_front();
        }
        self.history.push_back(track);
    }
}

/// Point-in-time view of a player, used to render queue listings.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueInfo {
    pub current: Option<Track>,
    pub position_ms: u64,
    pub items: Vec<Track>,
    pub repeat_mode: RepeatMode,
    pub shuffle: bool,
    pub total_duration: Duration,
}

impl QueueInfo {
    /// Obtiene una página específica de la cola (las páginas empiezan en 1)
    pub fn get_page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let per_page = items_per_page.max(1);
        let total_items = self.items.len();
        let total_pages = total_items.div_ceil(per_page).max(1);
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * per_page;
        let end = (start + per_page).min(total_items);

        QueuePage {
            items: self.items[start..end].to_vec(),
            first_index: start,
            current_page,
            total_pages,
            total_items,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueuePage {
    pub items: Vec<Track>,
    /// Zero-based queue index of `items[0]`.
    pub first_index: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}
