/*!
The device half of the core: announcing an enabled device's presence on
the network, serving its description/control/eventing endpoints, and
managing the GENA subscriptions attached to its services.
*/
pub mod announce;
pub mod search_listener;
pub mod server_farm;
pub mod subscribe;
