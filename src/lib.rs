
// Driver building blocks: the Interface seam, channel tables, options, errors and shared IEEE 488.2 utilities
pub mod ivi;

// Instrument drivers, one module per model
pub mod devices;
