//! Fixed adjacency over the cell population.
//!
//! Every duct is provisioned here, at construction, for every adjacency and
//! every duct class. After that only cell contents and buffer contents change.

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::cell::{Cell, CellState, Link, Port, SpawnPacket, StatePacket};
use crate::conduit::{Backend, Duct, Inlet, Outlet, SavedDuct};
use crate::config::{Config, Windows};
use crate::error::ConfigurationError;
use crate::logging::{log, obj, v_str, Domain, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId(pub usize);

impl CellId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    pub x: usize,
    pub y: usize,
}

/// Cardinal directions in stable compass order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Direction::North, Direction::East, Direction::South, Direction::West];

    pub fn opposite(&self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::East => "east",
            Direction::South => "south",
            Direction::West => "west",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutKind {
    /// Wrapping 2-D grid, four neighbors, undirected.
    Torus,
    /// Wrapping 1-D ring over `width` cells, undirected.
    Ring,
    /// Ring where every cell only sends east and only hears from the west.
    DirectedRing,
}

impl LayoutKind {
    pub fn from_name(name: &str) -> Result<Self, ConfigurationError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "torus" => Ok(LayoutKind::Torus),
            "ring" => Ok(LayoutKind::Ring),
            "directed_ring" | "directed-ring" => Ok(LayoutKind::DirectedRing),
            other => Err(ConfigurationError::UnknownLayout(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutKind::Torus => "torus",
            LayoutKind::Ring => "ring",
            LayoutKind::DirectedRing => "directed_ring",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub kind: LayoutKind,
    pub width: usize,
    pub height: usize,
}

impl Layout {
    pub fn from_config(cfg: &Config) -> Self {
        let height = match cfg.layout {
            LayoutKind::Torus => cfg.height,
            LayoutKind::Ring | LayoutKind::DirectedRing => 1,
        };
        Self { kind: cfg.layout, width: cfg.width, height }
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Directions a cell holds a port for.
    pub fn port_directions(&self) -> &'static [Direction] {
        match self.kind {
            LayoutKind::Torus => &Direction::ALL,
            LayoutKind::Ring | LayoutKind::DirectedRing => &[Direction::East, Direction::West],
        }
    }

    /// Directions a cell sends toward.
    pub fn send_directions(&self) -> &'static [Direction] {
        match self.kind {
            LayoutKind::Torus => &Direction::ALL,
            LayoutKind::Ring => &[Direction::East, Direction::West],
            LayoutKind::DirectedRing => &[Direction::East],
        }
    }

    pub fn is_symmetric(&self) -> bool {
        !matches!(self.kind, LayoutKind::DirectedRing)
    }

    pub fn coord(&self, id: CellId) -> Coord {
        Coord { x: id.0 % self.width, y: id.0 / self.width }
    }

    pub fn id_at(&self, coord: Coord) -> CellId {
        CellId(coord.y * self.width + coord.x)
    }

    /// The cell one step from `id` toward `dir`, wrapping at the edges.
    pub fn step(&self, id: CellId, dir: Direction) -> CellId {
        let Coord { x, y } = self.coord(id);
        let (w, h) = (self.width, self.height);
        let next = match dir {
            Direction::North => Coord { x, y: (y + h - 1) % h },
            Direction::South => Coord { x, y: (y + 1) % h },
            Direction::East => Coord { x: (x + 1) % w, y },
            Direction::West => Coord { x: (x + w - 1) % w, y },
        };
        self.id_at(next)
    }
}

/// Which kind of traffic a duct carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuctClass {
    Resource,
    State,
    Spawn,
}

impl DuctClass {
    pub const ALL: [DuctClass; 3] = [DuctClass::Resource, DuctClass::State, DuctClass::Spawn];

    pub fn as_str(&self) -> &'static str {
        match self {
            DuctClass::Resource => "resource",
            DuctClass::State => "state",
            DuctClass::Spawn => "spawn",
        }
    }

    pub fn window(&self, windows: &Windows) -> usize {
        match self {
            DuctClass::Resource => windows.resource,
            DuctClass::State => windows.state,
            DuctClass::Spawn => windows.spawn,
        }
    }
}

/// Payload types that ride a duct class, and where they sit on a port.
pub trait Carried: Clone + Send + 'static {
    const CLASS: DuctClass;
    fn link(port: &Port) -> &Link<Self>;
    fn link_mut(port: &mut Port) -> &mut Link<Self>;
}

impl Carried for f64 {
    const CLASS: DuctClass = DuctClass::Resource;
    fn link(port: &Port) -> &Link<Self> {
        &port.resource
    }
    fn link_mut(port: &mut Port) -> &mut Link<Self> {
        &mut port.resource
    }
}

impl Carried for StatePacket {
    const CLASS: DuctClass = DuctClass::State;
    fn link(port: &Port) -> &Link<Self> {
        &port.state
    }
    fn link_mut(port: &mut Port) -> &mut Link<Self> {
        &mut port.state
    }
}

impl Carried for SpawnPacket {
    const CLASS: DuctClass = DuctClass::Spawn;
    fn link(port: &Port) -> &Link<Self> {
        &port.spawn
    }
    fn link_mut(port: &mut Port) -> &mut Link<Self> {
        &mut port.spawn
    }
}

/// Identity of one provisioned duct, scoped to the epoch (`generation`) it
/// was looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DuctAddress {
    pub generation: u64,
    pub from: CellId,
    pub to: CellId,
    pub direction: Direction,
    pub class: DuctClass,
}

/// Read-only view across both endpoints of one duct.
#[derive(Debug)]
pub struct DuctRef<'a, T> {
    pub address: DuctAddress,
    inlet: &'a Inlet<T>,
    outlet: &'a Outlet<T>,
}

impl<T: Clone> DuctRef<'_, T> {
    pub fn backend(&self) -> Backend {
        self.inlet.backend()
    }

    pub fn write_head(&self) -> u64 {
        self.inlet.write_head()
    }

    pub fn read_head(&self) -> u64 {
        self.outlet.read_head()
    }

    pub fn window(&self) -> usize {
        self.outlet.window()
    }

    /// `min(W, write_head - read_head)`.
    pub fn occupancy(&self) -> usize {
        let backlog = self.write_head().saturating_sub(self.read_head());
        (backlog as usize).min(self.window())
    }
}

/// The ducts a cell writes toward one direction, one per class.
#[derive(Debug)]
pub struct PortDucts<'a> {
    pub resource: DuctRef<'a, f64>,
    pub state: DuctRef<'a, StatePacket>,
    pub spawn: DuctRef<'a, SpawnPacket>,
}

#[derive(Debug)]
pub struct Topology {
    layout: Layout,
    backend: Backend,
    windows: Windows,
    generation: u64,
    cells: Vec<Cell>,
}

impl Topology {
    pub fn new(cfg: &Config) -> Result<Self, ConfigurationError> {
        cfg.validate()?;
        let layout = Layout::from_config(cfg);
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let degree = layout.port_directions().len();

        let mut cells: Vec<Cell> = (0..layout.len())
            .map(|i| {
                let id = CellId(i);
                let program: Vec<u8> = (0..cfg.initial_genome_len).map(|_| rng.gen()).collect();
                Cell {
                    id,
                    coord: layout.coord(id),
                    state: CellState::founder(i, cfg.initial_stock, program, degree),
                    ports: layout
                        .port_directions()
                        .iter()
                        .map(|&dir| Port::new(dir, layout.step(id, dir)))
                        .collect(),
                    breakers: Vec::new(),
                    last_failure: None,
                }
            })
            .collect();

        let mut ducts = 0usize;
        for i in 0..cells.len() {
            for &dir in layout.send_directions() {
                let from = CellId(i);
                let to = layout.step(from, dir);
                install(&mut cells, from, to, dir, Duct::<f64>::new(cfg.backend, cfg.windows.resource));
                install(&mut cells, from, to, dir, Duct::<StatePacket>::new(cfg.backend, cfg.windows.state));
                install(&mut cells, from, to, dir, Duct::<SpawnPacket>::new(cfg.backend, cfg.windows.spawn));
                ducts += 3;
            }
        }

        log(
            Level::Info,
            Domain::Topology,
            "provisioned",
            obj(&[
                ("layout", v_str(layout.kind.as_str())),
                ("cells", serde_json::json!(cells.len())),
                ("ducts", serde_json::json!(ducts)),
                ("backend", v_str(cfg.backend.as_str())),
            ]),
        );

        Ok(Self {
            layout,
            backend: cfg.backend,
            windows: cfg.windows,
            generation: 0,
            cells,
        })
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn windows(&self) -> Windows {
        self.windows
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn is_symmetric(&self) -> bool {
        self.layout.is_symmetric()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(id.0)
    }

    pub(crate) fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    /// Out-neighbors in the layout's stable direction order.
    pub fn neighbors(&self, id: CellId) -> Vec<CellId> {
        self.layout
            .send_directions()
            .iter()
            .map(|&dir| self.layout.step(id, dir))
            .collect()
    }

    pub fn neighbor(&self, id: CellId, dir: Direction) -> Option<CellId> {
        if id.0 >= self.cells.len() || !self.layout.port_directions().contains(&dir) {
            return None;
        }
        Some(self.layout.step(id, dir))
    }

    /// Lookup of the ducts `id` writes toward `dir`. Nothing is created here.
    pub fn duct_for(&self, id: CellId, dir: Direction) -> Option<PortDucts<'_>> {
        Some(PortDucts {
            resource: self.duct_ref::<f64>(id, dir)?,
            state: self.duct_ref::<StatePacket>(id, dir)?,
            spawn: self.duct_ref::<SpawnPacket>(id, dir)?,
        })
    }

    pub fn duct_ref<T: Carried>(&self, id: CellId, dir: Direction) -> Option<DuctRef<'_, T>> {
        let from = self.cells.get(id.0)?;
        let to = self.layout.step(id, dir);
        let inlet = T::link(from.port(dir)?).inlet.as_ref()?;
        let outlet = T::link(self.cells.get(to.0)?.port(dir.opposite())?).outlet.as_ref()?;
        Some(DuctRef {
            address: DuctAddress {
                generation: self.generation,
                from: id,
                to,
                direction: dir,
                class: T::CLASS,
            },
            inlet,
            outlet,
        })
    }

    /// Drop consumed storage in every outlet. Returns messages released.
    pub(crate) fn compact(&mut self) -> usize {
        let mut released = 0;
        for cell in &mut self.cells {
            for port in &mut cell.ports {
                if let Some(o) = port.resource.outlet.as_mut() {
                    released += o.compact();
                }
                if let Some(o) = port.state.outlet.as_mut() {
                    released += o.compact();
                }
                if let Some(o) = port.spawn.outlet.as_mut() {
                    released += o.compact();
                }
            }
        }
        released
    }

    /// Messages dropped unread across every outlet since provisioning.
    pub(crate) fn overflow_skips(&mut self) -> u64 {
        let mut skipped = 0;
        for cell in &mut self.cells {
            for port in &mut cell.ports {
                skipped += port.resource.outlet.as_mut().map_or(0, |o| o.skipped());
                skipped += port.state.outlet.as_mut().map_or(0, |o| o.skipped());
                skipped += port.spawn.outlet.as_mut().map_or(0, |o| o.skipped());
            }
        }
        skipped
    }

    /// Export one duct's heads and window for a checkpoint.
    pub(crate) fn save_duct<T: Carried>(&mut self, from: CellId, dir: Direction) -> Option<SavedDuct<T>> {
        let to = self.layout.step(from, dir);
        let write_head = T::link(self.cells.get(from.0)?.port(dir)?).inlet.as_ref()?.write_head();
        let outlet = T::link_mut(self.cells.get_mut(to.0)?.port_mut(dir.opposite())?)
            .outlet
            .as_mut()?;
        let mut saved = save_outlet(outlet);
        saved.write_head = write_head;
        Some(saved)
    }

    /// Replace one duct with one rebuilt from a checkpoint.
    pub(crate) fn restore_duct<T: Carried>(
        &mut self,
        from: CellId,
        dir: Direction,
        saved: SavedDuct<T>,
    ) -> Result<(), ConfigurationError> {
        if from.0 >= self.cells.len() || !self.layout.send_directions().contains(&dir) {
            return Err(ConfigurationError::UnpairedEndpoints);
        }
        let to = self.layout.step(from, dir);
        let window = T::CLASS.window(&self.windows);
        let duct = Duct::restore(self.backend, window, saved);
        install(&mut self.cells, from, to, dir, duct);
        Ok(())
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }
}

fn save_outlet<T: Clone>(outlet: &mut Outlet<T>) -> SavedDuct<T> {
    let window = outlet.read_window();
    SavedDuct {
        write_head: window.end_seq(),
        read_head: outlet.read_head(),
        messages: window.into_messages(),
    }
}

fn install<T: Carried>(cells: &mut [Cell], from: CellId, to: CellId, dir: Direction, duct: Duct<T>) {
    let (inlet, outlet) = duct.split();
    if let Some(port) = cells[from.0].port_mut(dir) {
        T::link_mut(port).inlet = Some(inlet);
    }
    if let Some(port) = cells[to.0].port_mut(dir.opposite()) {
        T::link_mut(port).outlet = Some(outlet);
    }
}
