//! Visualization of decoded routes.
//!
//! Generates SVG plots of the depot, the customers and each vehicle's arcs,
//! plus a per-vehicle load chart.

use crate::instance::{Instance, Point};
use crate::solution::RouteSolution;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::process::Command;
#[cfg(feature = "resvg")]
use resvg::usvg;
#[cfg(feature = "resvg")]
use resvg::render;
#[cfg(feature = "resvg")]
use resvg::FitTo;
#[cfg(feature = "resvg")]
use resvg::tiny_skia::{Pixmap, Transform};
#[cfg(feature = "resvg")]
use resvg::usvg::TreeParsing;

/// Stroke colors cycled over vehicles.
const PALETTE: [&str; 8] = [
    "#3498db", "#e67e22", "#2ecc71", "#9b59b6", "#e74c3c", "#1abc9c", "#f1c40f", "#34495e",
];

/// SVG visualization generator
pub struct Visualizer {
    /// Canvas width
    pub width: f64,
    /// Canvas height
    pub height: f64,
    /// Margin
    pub margin: f64,
    /// Node radius
    pub node_radius: f64,
}

impl Default for Visualizer {
    fn default() -> Self {
        Visualizer {
            width: 800.0,
            height: 800.0,
            margin: 50.0,
            node_radius: 8.0,
        }
    }
}

fn vehicle_color(k: usize) -> &'static str {
    PALETTE[k % PALETTE.len()]
}

impl Visualizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route plot: depot, labeled customers and one colored arc set per vehicle.
    pub fn generate_svg(&self, instance: &Instance, solution: &RouteSolution) -> String {
        let mut svg = String::new();

        let (min_x, max_x, min_y, max_y) = self.get_bounds(instance);

        let scale_x = (self.width - 2.0 * self.margin) / (max_x - min_x).max(1.0);
        let scale_y = (self.height - 2.0 * self.margin) / (max_y - min_y).max(1.0);
        let scale = scale_x.min(scale_y);

        svg.push_str(&svg_header(
            self.width,
            self.height,
            ".customer { fill: #3498db; stroke: #2c3e50; stroke-width: 2; }
    .depot { fill: #e74c3c; stroke: #c0392b; stroke-width: 2; }
    .edge { stroke-width: 2; fill: none; }
    .label { font-family: Arial; font-size: 10px; fill: #2c3e50; }",
        ));

        svg.push_str(&format!(
            r##"<text x="{}" y="25" class="title">{} customers, {} vehicles | Objective: {:.2} | Distance: {:.2}</text>
"##,
            self.margin,
            instance.num_customers(),
            instance.num_vehicles(),
            solution.objective_value,
            solution.total_distance
        ));

        let transform = |p: Point| -> (f64, f64) {
            let tx = self.margin + (p.x - min_x) * scale;
            let ty = self.height - self.margin - (p.y - min_y) * scale;
            (tx, ty)
        };

        svg.push_str("<defs>\n");
        for k in 0..instance.num_vehicles().min(PALETTE.len()) {
            svg.push_str(&format!(
                r##"<marker id="arrow{}" markerWidth="10" markerHeight="10" refX="9" refY="3" orient="auto" markerUnits="strokeWidth">
<path d="M0,0 L0,6 L9,3 z" fill="{}"/>
</marker>
"##,
                k,
                vehicle_color(k)
            ));
        }
        svg.push_str("</defs>\n");

        for route in &solution.routes {
            let color = vehicle_color(route.vehicle);
            let marker = route.vehicle % PALETTE.len();
            for &(i, j) in &route.arcs {
                let (x1, y1) = transform(instance.location(i));
                let (x2, y2) = transform(instance.location(j));
                svg.push_str(&format!(
                    r#"<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" class="edge" stroke="{}" marker-end="url(#arrow{})"/>
"#,
                    x1, y1, x2, y2, color, marker
                ));
            }
        }

        let (dx, dy) = transform(instance.depot);
        svg.push_str(&format!(
            r##"<rect x="{:.2}" y="{:.2}" width="{}" height="{}" class="depot"/>
<text x="{:.2}" y="{:.2}" class="label" text-anchor="middle">Depot</text>
"##,
            dx - self.node_radius,
            dy - self.node_radius,
            2.0 * self.node_radius,
            2.0 * self.node_radius,
            dx,
            dy - self.node_radius - 3.0
        ));

        for customer in &instance.customers {
            let (x, y) = transform(customer.location);
            svg.push_str(&format!(
                r##"<circle cx="{:.2}" cy="{:.2}" r="{}" class="customer"/>
<text x="{:.2}" y="{:.2}" class="label" text-anchor="middle">{}</text>
"##,
                x,
                y,
                self.node_radius,
                x,
                y - self.node_radius - 3.0,
                customer.name
            ));
        }

        let legend_y = self.height - 30.0;
        for (slot, route) in solution.routes.iter().enumerate() {
            let x = self.margin + slot as f64 * 90.0;
            svg.push_str(&format!(
                r##"<rect x="{:.2}" y="{}" width="15" height="15" fill="{}"/>
<text x="{:.2}" y="{}" class="label">Vehicle {}</text>
"##,
                x,
                legend_y,
                vehicle_color(route.vehicle),
                x + 20.0,
                legend_y + 12.0,
                route.vehicle + 1
            ));
        }

        svg.push_str("</svg>");

        svg
    }

    /// Bar chart of realized load against capacity, one bar per vehicle.
    pub fn generate_load_svg(&self, solution: &RouteSolution) -> String {
        let mut svg = String::new();

        let width = self.width;
        let height = 300.0;
        let margin = 50.0;

        svg.push_str(&svg_header(
            width,
            height,
            ".capacity { stroke: #e74c3c; stroke-width: 1; stroke-dasharray: 5,5; }
    .axis { stroke: #2c3e50; stroke-width: 1; }
    .label { font-family: Arial; font-size: 12px; fill: #2c3e50; }",
        ));
        svg.push_str(&format!("<text x=\"{}\" y=\"25\" class=\"title\">Vehicle loads</text>\n", margin));

        let plot_width = width - 2.0 * margin;
        let plot_height = height - 2.0 * margin;
        let baseline = height - margin;
        let y_max = solution
            .routes
            .iter()
            .map(|r| r.load.max(r.capacity))
            .fold(1.0, f64::max);
        let y_scale = plot_height / y_max;
        let slot = plot_width / solution.routes.len().max(1) as f64;

        svg.push_str(&format!(
            r##"<line x1="{}" y1="{}" x2="{}" y2="{}" class="axis"/>
"##,
            margin,
            baseline,
            width - margin,
            baseline
        ));

        for (n, route) in solution.routes.iter().enumerate() {
            let x = margin + n as f64 * slot + slot * 0.2;
            let bar_width = slot * 0.6;
            let bar_height = route.load * y_scale;
            let color = if route.load > route.capacity { "#e74c3c" } else { vehicle_color(route.vehicle) };
            let cap_y = baseline - route.capacity * y_scale;
            svg.push_str(&format!(
                r##"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="{}"/>
<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" class="capacity"/>
<text x="{:.2}" y="{:.2}" class="label" text-anchor="middle">V{}: {}/{}</text>
"##,
                x,
                baseline - bar_height,
                bar_width,
                bar_height,
                color,
                x,
                cap_y,
                x + bar_width,
                cap_y,
                x + bar_width / 2.0,
                baseline + 15.0,
                route.vehicle + 1,
                route.load,
                route.capacity
            ));
        }

        svg.push_str("</svg>");

        svg
    }

    /// Save SVG to file
    pub fn save_svg<P: AsRef<Path>>(&self, svg: &str, path: P) -> std::io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(svg.as_bytes())?;
        Ok(())
    }

    /// Save SVG as PNG.
    /// Uses resvg when built with the `resvg` feature, otherwise tries `rsvg-convert`,
    /// then `magick convert`, then `inkscape`.
    pub fn save_png<P: AsRef<Path>>(&self, svg: &str, path: P) -> std::io::Result<()> {
        let path = path.as_ref();
        #[cfg(feature = "resvg")]
        {
            let opt = usvg::Options::default();
            let rtree = usvg::Tree::from_str(svg, &opt).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, format!("usvg parse error: {}", e)))?;
            let (w, h) = svg_size(svg).unwrap_or((self.width as u32, self.height as u32));
            let mut pixmap = Pixmap::new(w.max(1), h.max(1)).ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "Failed to create pixmap"))?;
            render(&rtree, FitTo::Original, Transform::default(), pixmap.as_mut()).ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "resvg render failed"))?;
            pixmap.save_png(path).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, format!("save_png failed: {}", e)))?;
            return Ok(());
        }

        // Fallback: write temporary svg and try external converters
        let tmp_svg = path.with_extension("svg.tmp");
        std::fs::write(&tmp_svg, svg)?;
        let tmp = tmp_svg.to_string_lossy().to_string();
        let out = path.to_string_lossy().to_string();

        let attempts: [(&str, Vec<&str>); 3] = [
            ("rsvg-convert", vec!["-o", out.as_str(), tmp.as_str()]),
            ("magick", vec!["convert", tmp.as_str(), out.as_str()]),
            ("inkscape", vec![tmp.as_str(), "--export-type=png", "--export-filename", out.as_str()]),
        ];
        for (program, args) in &attempts {
            if let Ok(status) = Command::new(program).args(args).status() {
                if status.success() {
                    let _ = std::fs::remove_file(&tmp_svg);
                    return Ok(());
                }
            }
        }

        let _ = std::fs::remove_file(&tmp_svg);
        Err(std::io::Error::new(std::io::ErrorKind::Other, "No SVG->PNG converter succeeded (tried rsvg-convert, magick, inkscape)"))
    }

    /// Get coordinate bounds over depot and customers
    fn get_bounds(&self, instance: &Instance) -> (f64, f64, f64, f64) {
        let mut min_x = instance.depot.x;
        let mut max_x = instance.depot.x;
        let mut min_y = instance.depot.y;
        let mut max_y = instance.depot.y;

        for c in &instance.customers {
            min_x = min_x.min(c.location.x);
            max_x = max_x.max(c.location.x);
            min_y = min_y.min(c.location.y);
            max_y = max_y.max(c.location.y);
        }

        (min_x, max_x, min_y, max_y)
    }

    /// Export data for external plotting (e.g., matplotlib)
    pub fn export_plot_data(&self, instance: &Instance, solution: &RouteSolution) -> String {
        let mut data = String::new();

        data.push_str("# CVRPTW Solution Data\n");
        data.push_str(&format!("# Objective: {:.2}\n", solution.objective_value));
        data.push_str(&format!("# Distance: {:.2}\n\n", solution.total_distance));

        data.push_str("# Nodes: id, name, x, y, demand\n");
        data.push_str(&format!("0,Depot,{},{},0\n", instance.depot.x, instance.depot.y));
        for c in &instance.customers {
            data.push_str(&format!("{},{},{},{},{}\n", c.id, c.name, c.location.x, c.location.y, c.demand));
        }

        data.push_str("\n# Arcs: vehicle, from, to\n");
        for route in &solution.routes {
            for &(i, j) in &route.arcs {
                data.push_str(&format!("{},{},{}\n", route.vehicle, i, j));
            }
        }

        data
    }
}

/// XML prolog, root element, shared title style plus `style` and the background.
fn svg_header(width: f64, height: f64, style: &str) -> String {
    format!(
        r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">
<style>
    {style}
    .title {{ font-family: Arial; font-size: 14px; fill: #2c3e50; font-weight: bold; }}
</style>
<rect width="100%" height="100%" fill="#ecf0f1"/>
"##,
        w = width,
        h = height,
        style = style
    )
}

/// `width`/`height` attributes of the root element.
#[cfg(feature = "resvg")]
fn svg_size(svg: &str) -> Option<(u32, u32)> {
    let attr = |name: &str| -> Option<u32> {
        let (_, rest) = svg.split_once(&format!("{}=\"", name))?;
        let (value, _) = rest.split_once('"')?;
        value.parse::<f64>().ok().map(|v| v as u32)
    };
    Some((attr("width")?, attr("height")?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::InstanceBuilder;
    use crate::solution::VehicleRoute;

    fn route(vehicle: usize, arcs: Vec<(usize, usize)>, load: f64) -> VehicleRoute {
        VehicleRoute {
            vehicle,
            customers: arcs.iter().map(|&(i, _)| i).collect(),
            arcs,
            tour: None,
            distance: 0.0,
            load,
            modeled_load: 0.0,
            capacity: 10.0,
            arrivals: Vec::new(),
        }
    }

    #[test]
    fn test_visualizer() {
        let instance = InstanceBuilder::new(3, 2, 4)
            .locations(vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(0.0, 1.0)])
            .build()
            .unwrap();
        let solution = RouteSolution {
            routes: vec![route(0, vec![(1, 2)], 4.0), route(1, vec![(2, 3), (3, 1)], 12.0)],
            objective_value: 3.0,
            total_distance: 3.0,
            inconsistencies: Vec::new(),
        };

        let viz = Visualizer::new();
        let svg = viz.generate_svg(&instance, &solution);
        assert!(svg.contains("svg"));
        assert!(svg.contains("ID_3"));
        assert!(svg.contains("Vehicle 2"));
        assert_eq!(svg.matches("class=\"edge\"").count(), 3);

        let loads = viz.generate_load_svg(&solution);
        assert!(loads.contains("V2: 12/10"));
        assert!(loads.contains("#e74c3c"));

        let data = viz.export_plot_data(&instance, &solution);
        assert!(data.contains("1,2,3"));
    }
}
