//! Rendering collaborator: draws the replicated world with macroquad.
//!
//! The core never interprets `graphic_id`; this module maps it to a color
//! swatch and draws simple sprites, camera pinned to the local player.
//! Rendering fidelity is explicitly not a goal of the client core.

use crate::store::EntityStore;
use macroquad::prelude::*;
use shared::EntityId;

const SPRITE_SIZE: f32 = 20.0;

pub struct Renderer {
    width: f32,
    height: f32,
}

impl Renderer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width: width as f32,
            height: height as f32,
        }
    }

    fn graphic_color(graphic_id: u32) -> Color {
        match graphic_id {
            1 => BLACK,
            3 => RED,
            10000 => GREEN,
            10001 => Color::from_rgba(34, 255, 0, 255),
            _ => Color::from_rgba(136, 136, 136, 255),
        }
    }

    fn camera_origin(&self, store: &EntityStore, local_id: Option<&EntityId>) -> (f32, f32) {
        match local_id.and_then(|id| store.by_id(id)) {
            Some(player) => (
                player.x - self.width / 2.0,
                player.y - self.height / 2.0,
            ),
            None => (0.0, 0.0),
        }
    }

    pub fn render(&mut self, store: &EntityStore, local_id: Option<&EntityId>, connected: bool) {
        clear_background(Color::from_rgba(16, 153, 187, 255));

        let (origin_x, origin_y) = self.camera_origin(store, local_id);

        // Lower layers first so higher layers draw on top
        let mut entities: Vec<_> = store.entities().collect();
        entities.sort_by_key(|e| e.layer);

        for entity in entities {
            let x = entity.x - origin_x;
            let y = entity.y - origin_y;
            let color = Self::graphic_color(entity.graphic_id);

            draw_rectangle(
                x - SPRITE_SIZE / 2.0,
                y - SPRITE_SIZE / 2.0,
                SPRITE_SIZE,
                SPRITE_SIZE,
                color,
            );
            draw_rectangle_lines(
                x - SPRITE_SIZE / 2.0,
                y - SPRITE_SIZE / 2.0,
                SPRITE_SIZE,
                SPRITE_SIZE,
                1.0,
                WHITE,
            );

            if let Some(heading) = entity.heading {
                let tip_x = x - heading.cos() * SPRITE_SIZE;
                let tip_y = y - heading.sin() * SPRITE_SIZE;
                draw_line(x, y, tip_x, tip_y, 2.0, YELLOW);
            }
        }

        self.draw_ui(store.len(), connected);
    }

    fn draw_ui(&self, entity_count: usize, connected: bool) {
        let connection_color = if connected { GREEN } else { RED };
        draw_rectangle(10.0, 10.0, 8.0, 8.0, connection_color);
        draw_text("CON", 22.0, 18.0, 12.0, WHITE);

        let count_text = format!("{} entities", entity_count);
        draw_text(&count_text, 10.0, 34.0, 12.0, WHITE);
    }

    /// Hit-tests a screen click against sprite bounds. Returns the clicked
    /// entity and the click position in world coordinates.
    pub fn pick(
        &self,
        store: &EntityStore,
        local_id: Option<&EntityId>,
        screen_x: f32,
        screen_y: f32,
    ) -> Option<(EntityId, f32, f32)> {
        let (origin_x, origin_y) = self.camera_origin(store, local_id);
        let world_x = screen_x + origin_x;
        let world_y = screen_y + origin_y;

        let half = SPRITE_SIZE / 2.0;
        store
            .entities()
            .filter(|e| (e.x - world_x).abs() <= half && (e.y - world_y).abs() <= half)
            .max_by_key(|e| e.layer)
            .map(|e| (e.id.clone(), world_x, world_y))
    }
}
