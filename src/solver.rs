//! Meld solver: a deterministic, budgeted heuristic that partitions a hand
//! into runs (color-sequence or same-rank cross-color sets) or pairs,
//! honoring jokers and the per-hand real okey.
//!
//! Greedy run-segmentation, then same-rank scanning with edge-borrowing,
//! then highest-scoring joker placement. This is a preview tool only —
//! never consulted for game-legality checks.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::tile::{Base, Color, RANKS};

const LOG_TARGET: &str = "solver";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MeldType {
    Run,
    Pair,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meld {
    #[serde(rename = "type")]
    pub meld_type: MeldType,
    pub tiles: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SolveMode {
    Run,
    Pair,
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveResult {
    pub melds: Vec<Meld>,
    pub used_tiles_count: usize,
    pub unused_tiles: Vec<String>,
    pub mode_used: SolveMode,
    /// Reserved for downstream scoring; always false.
    pub meets_run101: bool,
    /// Reserved for downstream scoring; always false.
    pub meets_pair5: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Classified {
    /// A colored tile whose base equals the hand's real okey base: fully wild.
    RealOkey,
    /// One of the two `JOKER-*` tiles: plays as a fixed indicator-successor identity.
    FalseOkey,
    Normal { color: Color, rank: u8 },
    /// Did not parse against the known grammar; never enters a meld.
    Unrecognized,
}

fn classify(id: &str, real_okey_base: Option<Base>) -> Classified {
    if id.starts_with("JOKER") {
        return Classified::FalseOkey;
    }
    if let Some(base) = real_okey_base {
        if id.starts_with(&base.to_id_string()) {
            return Classified::RealOkey;
        }
    }
    match crate::tile::Tile::parse(id) {
        Some(crate::tile::Tile::Normal { color, rank, .. }) => Classified::Normal { color, rank },
        _ => Classified::Unrecognized,
    }
}

/// `pool[color_index][rank - 1]` holds the ids still available at that
/// color/rank, in hand order (FIFO so identical copies are interchangeable).
type Pool = [[Vec<String>; 13]; 4];

fn empty_pool() -> Pool {
    std::array::from_fn(|_| std::array::from_fn(|_| Vec::new()))
}

fn pick(pool: &mut Pool, color: Color, rank: u8) -> Option<String> {
    let slot = &mut pool[color as usize][(rank - 1) as usize];
    if slot.is_empty() {
        None
    } else {
        Some(slot.remove(0))
    }
}

fn pool_has(pool: &Pool, color: Color, rank: u8) -> bool {
    !pool[color as usize][(rank - 1) as usize].is_empty()
}

struct RunGroup {
    color: Color,
    /// Ascending by rank.
    tiles: Vec<(u8, String)>,
    start: i32,
    end: i32,
}

impl RunGroup {
    fn length(&self) -> i32 {
        if self.end < self.start {
            0
        } else {
            self.end - self.start + 1
        }
    }

    fn start_tile(&self) -> Option<&(u8, String)> {
        (self.length() > 0).then(|| &self.tiles[self.start as usize])
    }

    fn end_tile(&self) -> Option<&(u8, String)> {
        (self.length() > 0).then(|| &self.tiles[self.end as usize])
    }

    fn borrow_start(&mut self) -> (u8, String) {
        let t = self.tiles[self.start as usize].clone();
        self.start += 1;
        t
    }

    fn borrow_end(&mut self) -> (u8, String) {
        let t = self.tiles[self.end as usize].clone();
        self.end -= 1;
        t
    }
}

struct EdgeRef {
    group_idx: usize,
    from_start: bool,
}

fn sum_range(start: i32, length: i32) -> i32 {
    length * (2 * start + (length - 1)) / 2
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum JokerKind {
    Set,
    Seq,
}

struct JokerCandidate {
    kind: JokerKind,
    color: Color,
    start: i32,
    length: i32,
    missing_rank: u8,
    rank: u8,
    colors: Vec<Color>,
    score: i32,
    tile_count: i32,
}

fn better(a: &JokerCandidate, b: &JokerCandidate) -> bool {
    if a.score != b.score {
        return a.score > b.score;
    }
    if a.tile_count != b.tile_count {
        return a.tile_count > b.tile_count;
    }
    a.kind == JokerKind::Seq && b.kind != JokerKind::Seq
}

/// Splits a maximal consecutive run of `total` tiles into groups of size
/// 5/4/3 greedily from the high end, leaving no remainder in `1..3`.
fn split_run_lengths(total: i32) -> Vec<i32> {
    let mut sizes = Vec::new();
    let mut remain = total;
    while remain >= 3 {
        let mut chosen = 0;
        for size in [5, 4, 3] {
            let rem = remain - size;
            if rem == 0 || rem >= 3 {
                chosen = size;
                break;
            }
        }
        if chosen == 0 {
            break;
        }
        sizes.push(chosen);
        remain -= chosen;
    }
    sizes
}

fn make_set_from_pool(pool: &mut Pool, rank: u8, colors: &[Color]) -> Option<Vec<String>> {
    let mut tiles = Vec::with_capacity(colors.len());
    for &c in colors {
        tiles.push(pick(pool, c, rank)?);
    }
    Some(tiles)
}

fn solve_runs(
    hand: &[(String, Classified)],
    indicator_base: Option<Base>,
) -> (Vec<Meld>, std::collections::HashSet<String>) {
    let mut used = std::collections::HashSet::new();
    let mut pool = empty_pool();
    let mut wild_tiles: Vec<String> = Vec::new();

    for (raw, info) in hand {
        match *info {
            Classified::RealOkey => wild_tiles.push(raw.clone()),
            Classified::FalseOkey => {
                if let Some(ind) = indicator_base {
                    let okey_rank = if ind.rank >= RANKS { 1 } else { ind.rank + 1 };
                    pool[ind.color as usize][(okey_rank - 1) as usize].push(raw.clone());
                }
            }
            Classified::Normal { color, rank } => {
                pool[color as usize][(rank - 1) as usize].push(raw.clone())
            }
            Classified::Unrecognized => {}
        }
    }

    let mut run_groups: Vec<RunGroup> = Vec::new();

    for color in Color::ALL {
        let nums: Vec<u8> = (1..=RANKS).filter(|&n| pool_has(&pool, color, n)).collect();
        if nums.len() < 3 {
            continue;
        }

        let mut seg_start = 0usize;
        for i in 1..=nums.len() {
            if i < nums.len() && nums[i] == nums[i - 1] + 1 {
                continue;
            }
            let seg_len = i - seg_start;
            if seg_len >= 3 {
                let group_sizes = split_run_lengths(seg_len as i32);
                let mut idx_end = i as i32 - 1;
                for sz in group_sizes {
                    let start_idx = idx_end - sz + 1;
                    let mut tiles = Vec::with_capacity(sz as usize);
                    for j in start_idx..=idx_end {
                        let n = nums[j as usize];
                        if let Some(id) = pick(&mut pool, color, n) {
                            tiles.push((n, id));
                        }
                    }
                    if tiles.len() >= 3 {
                        let len = tiles.len() as i32;
                        run_groups.push(RunGroup {
                            color,
                            tiles,
                            start: 0,
                            end: len - 1,
                        });
                    }
                    idx_end = start_idx - 1;
                }
            }
            seg_start = i;
        }
    }

    let mut melds = Vec::new();
    same_rank_pass(&mut pool, &mut run_groups, &mut used, &mut melds);

    for g in &run_groups {
        if g.length() < 3 {
            continue;
        }
        let mut tiles = Vec::new();
        let mut i = g.end;
        while i >= g.start {
            let (_, id) = &g.tiles[i as usize];
            tiles.push(id.clone());
            used.insert(id.clone());
            i -= 1;
        }
        if tiles.len() >= 3 {
            melds.push(Meld { meld_type: MeldType::Run, tiles });
        }
    }

    assign_wild_tiles(&mut pool, wild_tiles, &mut melds, &mut used);

    (melds, used)
}

fn same_rank_pass(
    pool: &mut Pool,
    run_groups: &mut [RunGroup],
    used: &mut std::collections::HashSet<String>,
    melds: &mut Vec<Meld>,
) {
    for rank in (1..=RANKS).rev() {
        let mut pool_colors: Vec<Color> = Color::ALL
            .into_iter()
            .filter(|&c| pool_has(pool, c, rank))
            .collect();

        let mut edge_colors: HashMap<Color, EdgeRef> = HashMap::new();
        for (gi, g) in run_groups.iter().enumerate() {
            if g.length() <= 3 {
                continue;
            }
            if let Some((n, _)) = g.start_tile() {
                if *n == rank && !pool_colors.contains(&g.color) {
                    edge_colors.insert(g.color, EdgeRef { group_idx: gi, from_start: true });
                }
            }
            if let Some((n, _)) = g.end_tile() {
                if *n == rank && !pool_colors.contains(&g.color) {
                    edge_colors.insert(g.color, EdgeRef { group_idx: gi, from_start: false });
                }
            }
        }

        let total_colors = pool_colors.len() + edge_colors.len();
        if total_colors < 3 {
            continue;
        }
        let target = if total_colors >= 4 { 4 } else { 3 };

        let try_select = |target_size: usize,
                           pool_colors: &[Color],
                           edge_colors: &HashMap<Color, EdgeRef>,
                           run_groups: &[RunGroup]|
         -> Option<(Vec<Color>, Vec<Color>)> {
            let mut selected_pool = Vec::new();
            let mut selected_edges = Vec::new();
            for &c in &Color::ALL {
                if pool_colors.contains(&c) && selected_pool.len() + selected_edges.len() < target_size {
                    selected_pool.push(c);
                }
            }
            for &c in &Color::ALL {
                if selected_pool.len() + selected_edges.len() >= target_size {
                    break;
                }
                if let Some(edge) = edge_colors.get(&c) {
                    if run_groups[edge.group_idx].length() > 3 {
                        selected_edges.push(c);
                    }
                }
            }
            if selected_pool.len() + selected_edges.len() < target_size {
                return None;
            }
            Some((selected_pool, selected_edges))
        };

        let selection = try_select(target, &pool_colors, &edge_colors, run_groups).or_else(|| {
            if target == 4 {
                try_select(3, &pool_colors, &edge_colors, run_groups)
            } else {
                None
            }
        });

        let Some((pool_sel, edge_sel)) = selection else {
            continue;
        };

        let Some(mut tiles) = make_set_from_pool(pool, rank, &pool_sel) else {
            continue;
        };
        for c in edge_sel {
            let edge_group_idx = edge_colors[&c].group_idx;
            let from_start = edge_colors[&c].from_start;
            let g = &mut run_groups[edge_group_idx];
            if g.length() <= 3 {
                continue;
            }
            let (_, id) = if from_start { g.borrow_start() } else { g.borrow_end() };
            tiles.push(id);
        }

        if tiles.len() >= 3 {
            for id in &tiles {
                used.insert(id.clone());
            }
            melds.push(Meld { meld_type: MeldType::Run, tiles });
        }
    }
}

fn assign_wild_tiles(
    pool: &mut Pool,
    mut wild_tiles: Vec<String>,
    melds: &mut Vec<Meld>,
    used: &mut std::collections::HashSet<String>,
) {
    loop {
        if wild_tiles.is_empty() {
            break;
        }
        let Some(best) = best_joker(pool) else { break };
        let jid = wild_tiles.remove(0);

        match best.kind {
            JokerKind::Set => {
                let Some(mut tiles) = make_set_from_pool(pool, best.rank, &best.colors) else {
                    continue;
                };
                for id in &tiles {
                    used.insert(id.clone());
                }
                tiles.push(jid.clone());
                used.insert(jid);
                melds.push(Meld { meld_type: MeldType::Run, tiles });
            }
            JokerKind::Seq => {
                let end = best.start + best.length - 1;
                let mut tiles = Vec::new();
                let mut n = end;
                while n >= best.start {
                    if n as u8 == best.missing_rank {
                        tiles.push(jid.clone());
                        used.insert(jid.clone());
                    } else if let Some(id) = pick(pool, best.color, n as u8) {
                        used.insert(id.clone());
                        tiles.push(id);
                    } else {
                        break;
                    }
                    n -= 1;
                }
                if tiles.len() >= 3 {
                    melds.push(Meld { meld_type: MeldType::Run, tiles });
                }
            }
        }
    }
}

fn best_joker(pool: &Pool) -> Option<JokerCandidate> {
    let mut best: Option<JokerCandidate> = None;
    let mut consider = |candidate: JokerCandidate| match &best {
        None => best = Some(candidate),
        Some(cur) => {
            if better(&candidate, cur) {
                best = Some(candidate);
            }
        }
    };

    for rank in (1..=RANKS).rev() {
        let colors: Vec<Color> = Color::ALL.into_iter().filter(|&c| pool_has(pool, c, rank)).collect();
        if colors.len() >= 2 {
            let size = if colors.len() >= 3 { 4 } else { 3 };
            consider(JokerCandidate {
                kind: JokerKind::Set,
                color: colors[0],
                start: 0,
                length: 0,
                missing_rank: 0,
                rank,
                colors: colors[..size - 1].to_vec(),
                score: rank as i32 * size as i32,
                tile_count: size as i32,
            });
        }
    }

    for color in Color::ALL {
        let avail: Vec<bool> = (1..=RANKS).map(|n| pool_has(pool, color, n)).collect();
        for start in 1..=RANKS as i32 {
            for length in (3..=5).rev() {
                let end = start + length - 1;
                if end > RANKS as i32 {
                    continue;
                }
                let mut missing = 0;
                let mut missing_rank = 0u8;
                let mut present = 0;
                for n in start..=end {
                    if avail[(n - 1) as usize] {
                        present += 1;
                    } else {
                        missing += 1;
                        missing_rank = n as u8;
                        if missing > 1 {
                            break;
                        }
                    }
                }
                if missing != 1 || present < 2 {
                    continue;
                }
                consider(JokerCandidate {
                    kind: JokerKind::Seq,
                    color,
                    start,
                    length,
                    missing_rank,
                    rank: 0,
                    colors: Vec::new(),
                    score: sum_range(start, length),
                    tile_count: length,
                });
            }
        }
    }

    best
}

fn solve_pairs(hand: &[(String, Classified)]) -> (Vec<Meld>, std::collections::HashSet<String>) {
    let mut used = std::collections::HashSet::new();
    let mut by_base: std::collections::BTreeMap<String, Vec<String>> = std::collections::BTreeMap::new();

    for (raw, info) in hand {
        if let Classified::Normal { color, rank } = info {
            by_base
                .entry(format!("{color}{rank:02}"))
                .or_default()
                .push(raw.clone());
        }
    }

    let mut melds = Vec::new();
    for ids in by_base.values() {
        let mut ids = ids.clone();
        while ids.len() >= 2 {
            let a = ids.remove(0);
            let b = ids.remove(0);
            used.insert(a.clone());
            used.insert(b.clone());
            melds.push(Meld {
                meld_type: MeldType::Pair,
                tiles: vec![a, b],
            });
        }
    }
    (melds, used)
}

fn unused_sort_key(id: &str) -> (u8, i16) {
    if id.len() < 3 {
        return (0, 0);
    }
    let color_rank = match id.as_bytes()[0] {
        b'R' => 0,
        b'B' => 1,
        b'G' => 2,
        b'K' => 3,
        _ => 0,
    };
    let num: i16 = id[1..3.min(id.len())].parse().unwrap_or(0);
    (color_rank, num)
}

fn build_result(
    hand: &[String],
    melds: Vec<Meld>,
    used: std::collections::HashSet<String>,
    mode: SolveMode,
) -> SolveResult {
    let used_tiles_count: usize = melds.iter().map(|m| m.tiles.len()).sum();
    let mut unused: Vec<String> = hand.iter().filter(|id| !used.contains(*id)).cloned().collect();
    unused.sort_by(|a, b| {
        let (ca, na) = unused_sort_key(a);
        let (cb, nb) = unused_sort_key(b);
        ca.cmp(&cb).then(nb.cmp(&na))
    });

    SolveResult {
        melds,
        used_tiles_count,
        unused_tiles: unused,
        mode_used: mode,
        meets_run101: false,
        meets_pair5: false,
    }
}

/// Produces meld suggestions for `hand` within the given wall-clock `budget`.
///
/// `indicator` is the raw indicator tile id; `real_okey_base` is the 3-char
/// okey base id (e.g. `"R08"`), both as currently recorded on the room.
pub fn suggest_melds(
    hand: &[String],
    indicator: &str,
    real_okey_base: &str,
    mode: SolveMode,
    budget: Duration,
) -> SolveResult {
    let start = Instant::now();
    let indicator_base = Base::parse(&indicator[..indicator.len().min(3)]);
    let real_okey_base = Base::parse(real_okey_base);

    let classified: Vec<(String, Classified)> = hand
        .iter()
        .map(|id| (id.clone(), classify(id, real_okey_base)))
        .collect();

    let make_plan = |m: SolveMode| -> (Vec<Meld>, std::collections::HashSet<String>) {
        match m {
            SolveMode::Pair => solve_pairs(&classified),
            _ => solve_runs(&classified, indicator_base),
        }
    };

    if mode != SolveMode::Auto {
        let (melds, used) = make_plan(mode);
        return build_result(hand, melds, used, mode);
    }

    let (mut best_melds, mut best_used) = make_plan(SolveMode::Run);
    let mut best_count: usize = best_melds.iter().map(|m| m.tiles.len()).sum();

    if start.elapsed() < budget {
        let (pair_melds, pair_used) = make_plan(SolveMode::Pair);
        let pair_count: usize = pair_melds.iter().map(|m| m.tiles.len()).sum();
        if pair_count > best_count {
            best_melds = pair_melds;
            best_used = pair_used;
            best_count = pair_count;
        }
    }
    tracing::trace!(
        target: LOG_TARGET,
        elapsed_us = start.elapsed().as_micros() as u64,
        used = best_count,
        "solver pass complete"
    );

    build_result(hand, best_melds, best_used, SolveMode::Auto)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(tiles: &[&str]) -> Vec<String> {
        tiles.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn run_solver_finds_five_long_sequence() {
        let hand = ids(&[
            "R01-1", "R02-1", "R03-1", "R04-1", "R05-1", "B11-1", "G03-1",
        ]);
        let result = suggest_melds(&hand, "B02-1", "B03", SolveMode::Run, Duration::from_millis(30));
        assert!(result
            .melds
            .iter()
            .any(|m| m.meld_type == MeldType::Run && m.tiles.len() == 5));
        assert_eq!(result.used_tiles_count + result.unused_tiles.len(), hand.len());
    }

    #[test]
    fn pair_solver_pairs_identical_tiles() {
        let hand = ids(&["R05-1", "R05-2", "B02-1", "G11-1"]);
        let result = suggest_melds(&hand, "K01-1", "K02", SolveMode::Pair, Duration::from_millis(30));
        assert_eq!(result.melds.len(), 1);
        assert_eq!(result.melds[0].meld_type, MeldType::Pair);
        assert_eq!(result.used_tiles_count, 2);
    }

    #[test]
    fn unused_sort_order_is_stable() {
        let hand = ids(&["K05-1", "R09-1", "B02-1", "R01-1"]);
        let result = suggest_melds(&hand, "K12-1", "K13", SolveMode::Run, Duration::from_millis(30));
        // no melds form; all four are unused, sorted R,B,G,K then rank desc.
        assert_eq!(result.unused_tiles, vec!["R09-1", "R01-1", "B02-1", "K05-1"]);
    }

    #[test]
    fn malformed_tile_is_never_used_and_never_panics() {
        let hand = ids(&["???", "R05-1", "R06-1", "R07-1"]);
        let result = suggest_melds(&hand, "B02-1", "B03", SolveMode::Run, Duration::from_millis(30));
        assert!(result.unused_tiles.contains(&"???".to_string()) || result.used_tiles_count == 3);
    }

    #[test]
    fn solver_is_idempotent_given_same_inputs() {
        let hand = ids(&["R01-1", "R02-1", "R03-1", "G09-1", "G09-2"]);
        let a = suggest_melds(&hand, "B02-1", "B03", SolveMode::Auto, Duration::from_millis(30));
        let b = suggest_melds(&hand, "B02-1", "B03", SolveMode::Auto, Duration::from_millis(30));
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
