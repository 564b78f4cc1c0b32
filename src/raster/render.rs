//! The per-scanline compositor.
//!
//! Sweeping a sorted scanline left to right, the renderer keeps two depth
//! heaps in lockstep: the *presentation* heap holds every material currently
//! active, the *removal* heap those whose OFF has been seen but which were
//! not on top when it arrived.  The top of the presentation heap is the
//! material that owns the pixels up to the next switch point.

use super::atlas::{MaterialId, TextureAtlas, NO_MATERIAL};
use super::heap::{HeapElement, MinHeap};
use super::scanline::ScanBuffer;
use super::sort::iterative_merge_sort;
use super::Rgba;

// Pop matched on/off pairs so the presentation top is a live material.
//
// Only the top and the slot directly beneath it are inspected; deeper ended
// entries linger until they surface, which bounds the work per switch point.
fn clean_up_heaps(p_heap: &mut MinHeap, r_heap: &mut MinHeap) {
    if r_heap.is_empty() {
        return; // nothing has ended; the common case
    }

    // first rank: ended materials sitting on top
    while let (Some(top), Some(next_remove)) = (p_heap.peek_min(), r_heap.peek_min()) {
        if top.id != next_remove.id {
            break;
        }
        p_heap.delete_min();
        r_heap.delete_min();
    }

    // second rank: an ended material hiding directly under the top
    let (Some(next_obj), Some(next_remove)) = (p_heap.peek_second(), r_heap.peek_min()) else {
        return;
    };
    if next_obj.id != next_remove.id {
        return;
    }
    if let Some(current) = p_heap.delete_min() {
        while let (Some(top), Some(rem)) = (p_heap.peek_min(), r_heap.peek_min()) {
            if top.id != rem.id {
                break;
            }
            p_heap.delete_min();
            r_heap.delete_min();
        }
        p_heap.insert(current); // put the live top back
    }
}

impl ScanBuffer {
    /// Render one scanline into `frame` (row-major, `width * height` pixels).
    ///
    /// Clean lines are skipped; pixels with no active material are left
    /// untouched.
    pub fn render_line(&mut self, atlas: &TextureAtlas, line_index: usize, frame: &mut [Rgba]) {
        if line_index >= self.height() {
            return;
        }
        if !self.lines[line_index].is_dirty() {
            return;
        }
        self.lines[line_index].set_clean();

        let count = self.lines[line_index].count();
        let y_off = self.width() * line_index;
        let end = self.width() as u32;

        // sort a scratch copy; the stored order stays intact for roll-backs
        self.spare_a[..count].copy_from_slice(self.lines[line_index].points());
        let list = iterative_merge_sort(&mut self.spare_a[..count], &mut self.spare_b[..count]);

        self.p_heap.clear();
        self.r_heap.clear();

        let mut on = false;
        let mut p: u32 = 0; // current pixel

        // texture cursor for the span being emitted
        let mut map_base: u32 = 0;
        let mut map_offset: u32 = 0;
        let mut map_increment: u32 = 0;
        let mut map_mask: u32 = 0;

        // most recent "on" switch of the top-most material
        let mut current_id: MaterialId = NO_MATERIAL;

        for (i, &sw) in list.iter().enumerate() {
            if sw.x() > end {
                break; // ran off the end
            }
            if sw.id() == NO_MATERIAL {
                continue;
            }

            if sw.x() > p {
                if on {
                    // render up to this switch point
                    let max = sw.x().min(end);
                    for pixel in &mut frame[y_off + p as usize..y_off + max as usize] {
                        *pixel = atlas.textel(map_base.wrapping_add(map_offset));
                        map_offset = (map_offset + map_increment) & map_mask;
                    }
                    p = max;
                } else {
                    p = sw.x(); // skip straight to the point
                }
            }

            let material = atlas.material(sw.id());
            let elem = HeapElement {
                depth: i32::from(material.depth),
                id: sw.id(),
                lookup: i,
            };
            if sw.is_on() {
                // a second ON of an already-active material is idempotent;
                // the active set is keyed by id
                if !self.p_heap.contains_id(sw.id()) {
                    self.p_heap.insert(elem);
                }
            } else {
                self.r_heap.insert(elem);
            }

            clean_up_heaps(&mut self.p_heap, &mut self.r_heap);

            match self.p_heap.peek_min() {
                Some(top) => {
                    on = true;
                    let next = list[top.lookup];
                    if current_id != next.id() {
                        // switching material: restart the texture cursor as
                        // if this material had been filling since its ON
                        current_id = next.id();
                        let paint = atlas.material(current_id);
                        map_base = paint.start_index;
                        map_increment = u32::from(paint.increment);
                        map_mask = u32::from(paint.length.wrapping_sub(1));
                        map_offset = if paint.screen_space {
                            (p.wrapping_add(u32::from(paint.start_offset)))
                                .wrapping_mul(map_increment)
                                & map_mask
                        } else {
                            u32::from(paint.start_offset)
                                .wrapping_add((p - next.x()).wrapping_mul(map_increment))
                                & map_mask
                        };
                    }
                }
                None => {
                    on = false;
                    map_base = 0;
                    // force a cursor rebuild when anything comes back on
                    current_id = NO_MATERIAL;
                }
            }
        }

        if on {
            // fill to the end of the line
            for pixel in &mut frame[y_off + p as usize..y_off + end as usize] {
                *pixel = atlas.textel(map_base.wrapping_add(map_offset));
                map_offset = (map_offset + map_increment) & map_mask;
            }
        }
    }

    /// Render every `skip + 1`-th line starting at `start` into `frame`.
    /// For a full-frame render use `start = 0, skip = 0`; for interlacing,
    /// alternate `start` between 0 and 1 with `skip = 1`.
    pub fn render_to_frame(
        &mut self,
        atlas: &TextureAtlas,
        frame: &mut [Rgba],
        start: usize,
        skip: usize,
    ) {
        debug_assert_eq!(frame.len(), self.width() * self.height());
        let mut y = start;
        while y < self.height() {
            self.render_line(atlas, y, frame);
            y += skip + 1;
        }
    }
}
